//! The fixed HID report schema emitted back to the driver. Byte-for-byte
//! layout is the driver's concern (it owns the union this enum stands in
//! for); this models only the fields the core needs to fill in.

/// Upper bound on simultaneously tracked touch slots in one report.
pub const MAX_CONTACTS: usize = 10;
pub const MAX_SINGLETOUCH: u16 = 32767;
pub const MAX_X: u16 = 9600;
pub const MAX_Y: u16 = 7200;
pub const MAX_PRESSURE: u16 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TouchContactReport {
    pub touch: bool,
    pub contact_id: u8,
    pub x: u16,
    pub y: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchReport {
    pub contact_num: u8,
    pub contacts: [TouchContactReport; MAX_CONTACTS],
}

impl Default for TouchReport {
    fn default() -> Self {
        Self {
            contact_num: 0,
            contacts: [TouchContactReport::default(); MAX_CONTACTS],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StylusReport {
    pub in_range: bool,
    pub touch: bool,
    pub side_button: bool,
    pub eraser: bool,
    pub x: u16,
    pub y: u16,
    pub tip_pressure: u16,
    pub x_tilt: i16,
    pub y_tilt: i16,
    pub scan_time: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IptsHidReport {
    Touch(TouchReport),
    Stylus(StylusReport),
}
