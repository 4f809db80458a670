//! Numeric primitives shared by the labeling, fitting, and touch-processing
//! crates: 2D images, symmetric 2x2 matrices with closed-form eigendecomposition,
//! and small fixed-size convolution kernels.

mod image;
mod kernel;
mod mat2;
mod num;
mod vec2;

pub use image::{Image, Index2};
pub use kernel::Kernel;
pub use mat2::{Eigen2, Mat2s};
pub use num::Epsilon;
pub use vec2::Vec2;
