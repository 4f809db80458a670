//! Cross-frame touch tracking: contact normalization, nearest-neighbor slot
//! assignment with stability-based eviction, and stylus-pointed palm
//! rejection cones.

mod cone;
mod manager;

pub use cone::Cone;
pub use manager::{TouchManager, INSTABILITY_THRESHOLD};
