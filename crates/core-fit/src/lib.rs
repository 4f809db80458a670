//! Windowed 2D Gaussian fitting over a heatmap region.
//!
//! Fits `f(x,y) = A * exp(-1/2 (p-mu)^T Sigma^-1 (p-mu))` to the pixel values
//! in a window around a candidate contact center. The fit works in log space:
//! `ln f` is a quadratic polynomial in `(x,y)`, so each iteration is an
//! ordinary weighted linear least squares solve for its six coefficients,
//! re-weighted by the current fitted amplitude (Caruana's method, iterated).
//! Converting those six coefficients back into `(mu, Sigma, A)` is closed
//! form: the quadratic and linear coefficients are exactly the fitted
//! precision matrix `Sigma^-1` and `Sigma^-1 * mu`.

use core_math::{Epsilon, Image, Index2, Mat2s, Vec2};

mod solve;

/// Parameters of a fitted Gaussian, in heatmap pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct GaussianParams {
    pub mean: Vec2<f64>,
    pub cov: Mat2s<f64>,
    pub scale: f64,
}

/// A reusable fitter: the window size and convergence knobs don't change
/// between calls, only the heatmap and candidate center do.
#[derive(Debug, Clone, Copy)]
pub struct GaussianFit {
    /// Half-width of the fitting window; the window is `2*radius + 1` square,
    /// clipped to the heatmap bounds.
    pub window_radius: i32,
    pub max_iterations: usize,
    /// Stop iterating once the parameter vector moves less than this between
    /// iterations.
    pub epsilon: f64,
    /// Pixel values are clamped to at least this before taking `ln`, since
    /// the model has no representation for zero or negative amplitude.
    pub value_floor: f32,
}

impl Default for GaussianFit {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianFit {
    pub fn new() -> Self {
        Self {
            window_radius: 5,
            max_iterations: 10,
            epsilon: 1e-6,
            value_floor: 1e-3,
        }
    }

    /// Fit a Gaussian to the window around `center` in `heatmap`. Returns
    /// `None` if the window has too few samples to determine six unknowns,
    /// the solve is numerically singular at any iteration, or the fitted
    /// shape isn't a valid (positive-definite) covariance.
    pub fn fit(&self, heatmap: &Image<f32>, center: Index2) -> Option<GaussianParams> {
        let size = heatmap.size();
        let x0 = (center.x - self.window_radius).max(0);
        let x1 = (center.x + self.window_radius).min(size.x - 1);
        let y0 = (center.y - self.window_radius).max(0);
        let y1 = (center.y + self.window_radius).min(size.y - 1);

        let mut samples: Vec<(f64, f64, f64)> = Vec::new();
        for y in y0..=y1 {
            for x in x0..=x1 {
                let v = heatmap[Index2::new(x, y)].max(self.value_floor);
                samples.push(((x - center.x) as f64, (y - center.y) as f64, v as f64));
            }
        }
        if samples.len() < 6 {
            return None;
        }

        let mut weights: Vec<f64> = samples.iter().map(|&(_, _, z)| z * z).collect();
        let mut prev: Option<[f64; 6]> = None;
        let mut result = None;

        for _ in 0..self.max_iterations {
            let c = solve::weighted_quadratic_fit(&samples, &weights)?;
            let params = Self::recover(c)?;

            let vec = [
                params.mean.x,
                params.mean.y,
                params.cov.xx,
                params.cov.xy,
                params.cov.yy,
                params.scale,
            ];
            let converged = prev.is_some_and(|p| {
                let d: f64 = vec.iter().zip(p.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
                d.sqrt() < self.epsilon
            });

            let precision = params.cov.inverse_eps(f64::EPS)?;
            weights = samples
                .iter()
                .map(|&(x, y, _)| {
                    let d = Vec2::new(x, y) - params.mean;
                    let f = params.scale * (-0.5 * precision.vtmv(d)).exp();
                    f * f
                })
                .collect();

            result = Some(params);
            if converged {
                break;
            }
            prev = Some(vec);
        }

        result.filter(|p| p.scale > 0.0 && Self::is_positive_definite(&p.cov))
    }

    fn is_positive_definite(m: &Mat2s<f64>) -> bool {
        m.xx > 0.0 && m.det() > 0.0
    }

    /// Recover `(mu, Sigma, A)` from the fitted log-quadratic coefficients
    /// `c = [c0, c1, c2, c3, c4, c5]` where
    /// `ln f(x,y) = c0 + c1*x + c2*y + c3*x^2 + c4*x*y + c5*y^2`.
    fn recover(c: [f64; 6]) -> Option<GaussianParams> {
        let precision = Mat2s::new(-2.0 * c[3], -c[4], -2.0 * c[5]);
        if precision.xx <= 0.0 || precision.det() <= 0.0 {
            return None;
        }
        let cov = precision.inverse_eps(f64::EPS)?;

        // mu = Sigma * [c1, c2], since [c1, c2] = precision * mu by construction.
        let mean = Vec2::new(cov.xx * c[1] + cov.xy * c[2], cov.xy * c[1] + cov.yy * c[2]);
        let ln_scale = c[0] + 0.5 * (mean.x * c[1] + mean.y * c[2]);

        Some(GaussianParams {
            mean,
            cov,
            scale: ln_scale.exp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_gaussian(size: Index2, mean: Vec2<f64>, cov: Mat2s<f64>, scale: f64) -> Image<f32> {
        let mut img: Image<f32> = Image::new(size);
        let precision = cov.inverse_eps(1e-12).unwrap();
        for y in 0..size.y {
            for x in 0..size.x {
                let d = Vec2::new(x as f64 - mean.x, y as f64 - mean.y);
                let v = scale * (-0.5 * precision.vtmv(d)).exp();
                img[Index2::new(x, y)] = v as f32;
            }
        }
        img
    }

    #[test]
    fn recovers_known_gaussian_parameters() {
        let mean = Vec2::new(10.3, 9.7);
        let cov = Mat2s::new(2.5, 0.3, 1.8);
        let scale = 200.0;
        let img = synthetic_gaussian(Index2::new(20, 20), mean, cov, scale);

        let fitter = GaussianFit::new();
        let fitted = fitter.fit(&img, Index2::new(10, 10)).expect("fit should converge");

        assert!((fitted.mean.x - mean.x).abs() < 1e-2);
        assert!((fitted.mean.y - mean.y).abs() < 1e-2);
        assert!((fitted.cov.xx - cov.xx).abs() < 1e-2);
        assert!((fitted.cov.xy - cov.xy).abs() < 1e-2);
        assert!((fitted.cov.yy - cov.yy).abs() < 1e-2);
        assert!((fitted.scale - scale).abs() < 1e-3 * scale);
    }

    #[test]
    fn flat_region_has_no_valid_peak() {
        let mut img: Image<f32> = Image::new(Index2::new(20, 20));
        img.fill(5.0);
        let fitter = GaussianFit::new();
        // A perfectly flat region fits c3 = c4 = c5 = 0, a non-positive-definite
        // precision matrix, and is correctly rejected.
        assert!(fitter.fit(&img, Index2::new(10, 10)).is_none());
    }

    #[test]
    fn window_is_clipped_at_image_border() {
        let mean = Vec2::new(1.0, 1.0);
        let cov = Mat2s::new(1.5, 0.0, 1.5);
        let img = synthetic_gaussian(Index2::new(10, 10), mean, cov, 150.0);

        let fitter = GaussianFit::new();
        let fitted = fitter.fit(&img, Index2::new(1, 1));
        assert!(fitted.is_some());
    }

    #[test]
    fn too_small_window_is_rejected() {
        let img: Image<f32> = Image::new(Index2::new(1, 1));
        let fitter = GaussianFit::new();
        assert!(fitter.fit(&img, Index2::new(0, 0)).is_none());
    }
}
