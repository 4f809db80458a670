//! Frame payloads as they arrive from the driver, before any core processing.
//! These mirror the original daemon's `SingletouchData`/`Heatmap`/
//! `StylusData`/`StylusDFTData` transport structs.

use core_math::{Image, Index2};

/// Number of complex DFT components per row (`IPTS_DFT_NUM_COMPONENTS`).
pub const DFT_NUM_COMPONENTS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SingletouchData {
    pub touch: bool,
    pub x: u16,
    pub y: u16,
}

#[derive(Debug, Clone)]
pub struct Heatmap {
    pub y_min: u8,
    pub y_max: u8,
    pub x_min: u8,
    pub x_max: u8,
    pub z_min: u8,
    pub z_max: u8,
    pub timestamp: u32,
    pub data: Image<u8>,
}

impl Heatmap {
    pub fn width(&self) -> i32 {
        self.data.size().x
    }

    pub fn height(&self) -> i32 {
        self.data.size().y
    }

    pub fn diagonal(&self) -> f32 {
        let Index2 { x, y } = self.data.size();
        ((x * x + y * y) as f32).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StylusData {
    pub proximity: bool,
    pub contact: bool,
    pub button: bool,
    pub rubber: bool,
    pub timestamp: u16,
    pub x: u16,
    pub y: u16,
    pub pressure: u16,
    pub altitude: u16,
    pub azimuth: u16,
    pub serial: u32,
}

/// One complex sample in a DFT row.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DftComponent {
    pub real: i32,
    pub imag: i32,
}

/// One row of `DFT_NUM_COMPONENTS` complex samples around a center frequency
/// bin, plus the bin offset of the first component and the row's magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct DftRow {
    pub first: u16,
    pub magnitude: u16,
    pub components: [DftComponent; DFT_NUM_COMPONENTS],
}

impl DftRow {
    /// Index of the center component within `components`.
    pub fn center(&self) -> usize {
        DFT_NUM_COMPONENTS / 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DftFrameKind {
    Position,
    Button,
    Pressure,
}

#[derive(Debug, Clone)]
pub struct StylusDftData {
    pub kind: DftFrameKind,
    pub timestamp: u16,
    pub num_cols: u16,
    pub num_rows: u16,
    pub dft_x: Vec<DftRow>,
    pub dft_y: Vec<DftRow>,
}

/// One decoded frame, as dispatched by the main loop to the appropriate core
/// path. Replaces the original daemon's callback-based parser (`on_*`
/// `std::function` fields): the parser hands back a value instead of
/// invoking a stored closure.
#[derive(Debug, Clone)]
pub enum Frame {
    Singletouch(SingletouchData),
    Heatmap(Heatmap),
    Stylus(StylusData),
    StylusDft(StylusDftData),
}
