//! Heatmap contact extraction: an advanced pipeline (structure tensor +
//! Hessian ridge response + weighted distance transform + Gaussian fitting)
//! and a basic flood-fill fallback, behind one dispatch enum chosen once at
//! construction per `Touch.Processing` configuration.

mod advanced;
mod basic;
mod stats;
mod wdt;

pub use advanced::{AdvancedConfig, AdvancedProcessor};
pub use basic::{BasicConfig, BasicProcessor};
pub use stats::ComponentStats;

use core_protocol::{Heatmap, TouchPoint};

/// Sensor bytes run "higher = less contact"; rescale into `[0,1]` by the
/// frame's own `z_min`/`z_max` and invert so that a stronger press yields a
/// larger value, matching the polarity every downstream contact-extraction
/// step assumes. `z_max == z_min` (a degenerate, signal-free frame) is
/// guarded by flooring the range at 1 rather than dividing by zero.
pub(crate) fn normalize_pixel(v: u8, z_min: u8, z_max: u8) -> f32 {
    let range = (z_max as f32 - z_min as f32).max(1.0);
    let scaled = (v as f32 - z_min as f32) / range;
    1.0 - scaled
}

/// Selects between the two touch processors. A per-frame `process` call is
/// one virtual dispatch (a match, not a vtable) rather than a trait object,
/// per the one-sum-type-is-enough design used throughout this core.
pub enum TouchProcessor {
    Basic(BasicProcessor),
    Advanced(AdvancedProcessor),
}

impl TouchProcessor {
    pub fn basic(config: BasicConfig) -> Self {
        Self::Basic(BasicProcessor::new(config))
    }

    pub fn advanced(config: AdvancedConfig) -> Self {
        Self::Advanced(AdvancedProcessor::new(config))
    }

    pub fn process(&mut self, heatmap: &Heatmap) -> Vec<TouchPoint> {
        match self {
            Self::Basic(p) => p.process(heatmap),
            Self::Advanced(p) => p.process(heatmap),
        }
    }
}
