//! Types shared across the contact-extraction, tracking, and stylus-decoding
//! crates. These are the values that actually cross component boundaries;
//! everything else (scratch buffers, intermediate fields) stays private to
//! the crate that owns a given stage.

use core_math::{Mat2s, Vec2};

/// One elliptical contact extracted from a heatmap, before tracking has
/// assigned it a stable slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub mean: Vec2<f32>,
    pub cov: Mat2s<f32>,
    pub scale: f32,
    pub confidence: f32,
    pub palm: bool,
}

/// A tracked touch contact, normalized and slot-stable across frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchInput {
    pub x: f32,
    pub y: f32,
    pub major: f32,
    pub minor: f32,
    pub orientation: f32,
    pub index: u8,
    pub active: bool,
    pub palm: bool,
    pub tracked: bool,
    /// Frames in a row with a large covariance-eigenvalue change.
    pub instability: u8,
    pub ev1: f32,
    pub ev2: f32,
}

impl TouchInput {
    pub fn new(index: u8) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            major: 0.0,
            minor: 0.0,
            orientation: 0.0,
            index,
            active: false,
            palm: false,
            tracked: false,
            instability: 0,
            ev1: 0.0,
            ev2: 0.0,
        }
    }
}

/// Continuous stylus state decoded from one or more DFT frames.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StylusInput {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
    pub proximity: bool,
    pub contact: bool,
    pub button: bool,
    pub rubber: bool,
}
