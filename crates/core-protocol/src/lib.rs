//! Shared data model and wire framing for the IPTS processing pipeline:
//! the frame payloads that arrive from the driver, the tracked contact and
//! stylus types the core stages pass between each other, and the HID report
//! shape emitted back out.

mod frame;
mod model;
mod parser;
mod report;

pub use frame::{DftComponent, DftFrameKind, DftRow, Frame, Heatmap, SingletouchData, StylusData, StylusDftData, DFT_NUM_COMPONENTS};
pub use model::{StylusInput, TouchInput, TouchPoint};
pub use parser::{parse_frame, ParseError};
pub use report::{IptsHidReport, StylusReport, TouchContactReport, TouchReport, MAX_CONTACTS, MAX_PRESSURE, MAX_SINGLETOUCH, MAX_X, MAX_Y};
