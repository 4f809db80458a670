//! Low-CPU fallback touch processor: 4-connected flood-fill clustering with
//! streaming first/second moments, no structure-tensor or Gaussian fitting.

use core_math::{Image, Index2, Mat2s, Vec2};
use core_protocol::{Heatmap, TouchPoint};

use crate::normalize_pixel;

#[derive(Debug, Clone, Copy)]
pub struct BasicConfig {
    /// Compared against the normalized `[0,1]` signal, not the raw byte.
    pub pressure_threshold: f32,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self { pressure_threshold: 0.04 }
    }
}

pub struct BasicProcessor {
    config: BasicConfig,
    visited: Image<bool>,
    values: Image<f32>,
    stack: Vec<usize>,
}

impl BasicProcessor {
    pub fn new(config: BasicConfig) -> Self {
        Self {
            config,
            visited: Image::new(Index2::new(0, 0)),
            values: Image::new(Index2::new(0, 0)),
            stack: Vec::new(),
        }
    }

    pub fn set_threshold(&mut self, pressure_threshold: f32) {
        self.config.pressure_threshold = pressure_threshold;
    }

    pub fn process(&mut self, heatmap: &Heatmap) -> Vec<TouchPoint> {
        let size = heatmap.data.size();
        self.visited.resize(size);
        self.values.resize(size);
        self.visited.fill(false);
        for (dst, &src) in self.values.iter_mut().zip(heatmap.data.iter()) {
            *dst = normalize_pixel(src, heatmap.z_min, heatmap.z_max);
        }

        let width = size.x as usize;
        let span = size.span() as usize;
        let threshold = self.config.pressure_threshold;

        let mut points = Vec::new();

        for seed in 0..span {
            if self.visited[seed] || self.values[seed] <= threshold {
                continue;
            }
            if !self.is_local_max(seed, size) {
                continue;
            }

            if let Some(point) = self.flood_fill(seed, width, span, threshold) {
                points.push(point);
            }
        }

        points
    }

    /// `>=` rather than strict `>` so the first pixel of a flat plateau
    /// (scanned in row-major order) always qualifies as its own seed; later
    /// plateau pixels are already marked visited by the time they're checked.
    fn is_local_max(&self, index: usize, size: Index2) -> bool {
        let width = size.x as usize;
        let span = size.span() as usize;
        let x = index % width;
        let v = self.values[index];

        let left = if x > 0 { self.values[index - 1] } else { f32::NEG_INFINITY };
        let right = if x + 1 < width { self.values[index + 1] } else { f32::NEG_INFINITY };
        let up = if index >= width { self.values[index - width] } else { f32::NEG_INFINITY };
        let down = if index + width < span { self.values[index + width] } else { f32::NEG_INFINITY };

        v >= left && v >= right && v >= up && v >= down
    }

    /// Explicit-stack flood fill (the original recurses per pixel, which can
    /// overflow the stack on large saturated regions).
    fn flood_fill(&mut self, seed: usize, width: usize, span: usize, threshold: f32) -> Option<TouchPoint> {
        self.stack.clear();
        self.stack.push(seed);
        self.visited[seed] = true;

        let mut sum_w = 0.0f64;
        let mut sum_wx = 0.0f64;
        let mut sum_wy = 0.0f64;
        let mut sum_wxx = 0.0f64;
        let mut sum_wyy = 0.0f64;
        let mut sum_wxy = 0.0f64;
        let mut peak = 0.0f32;
        let mut count = 0u32;

        while let Some(index) = self.stack.pop() {
            let x = (index % width) as f64;
            let y = (index / width) as f64;
            let w = self.values[index] as f64;

            sum_w += w;
            sum_wx += w * x;
            sum_wy += w * y;
            sum_wxx += w * x * x;
            sum_wyy += w * y * y;
            sum_wxy += w * x * y;
            peak = peak.max(self.values[index]);
            count += 1;

            let ix = index % width;
            let neighbors = [
                (ix > 0).then(|| index - 1),
                (ix + 1 < width).then_some(index + 1),
                index.checked_sub(width),
                (index + width < span).then_some(index + width),
            ];
            for n in neighbors.into_iter().flatten() {
                if !self.visited[n] && self.values[n] > threshold {
                    self.visited[n] = true;
                    self.stack.push(n);
                }
            }
        }

        if sum_w <= 0.0 {
            return None;
        }

        let mean_x = sum_wx / sum_w;
        let mean_y = sum_wy / sum_w;
        let mut var_x = (sum_wxx / sum_w - mean_x * mean_x).max(0.0);
        let mut var_y = (sum_wyy / sum_w - mean_y * mean_y).max(0.0);
        let cov_xy = sum_wxy / sum_w - mean_x * mean_y;

        // A single-pixel region has zero sample variance; nudge it positive
        // so the covariance stays a valid (invertible) ellipse downstream.
        if count <= 1 {
            var_x = 0.25;
            var_y = 0.25;
        }

        Some(TouchPoint {
            mean: Vec2::new(mean_x as f32, mean_y as f32),
            cov: Mat2s::new(var_x as f32, cov_xy as f32, var_y as f32),
            scale: peak,
            confidence: 1.0,
            palm: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a heatmap from raw sensor bytes ("higher = less contact"),
    /// with a fixed full-range `z_min`/`z_max` so raw values translate
    /// predictably under `normalize_pixel`.
    fn heatmap_from_rows(rows: &[&[u8]]) -> Heatmap {
        let h = rows.len() as i32;
        let w = rows[0].len() as i32;
        let mut data: Image<u8> = Image::new(Index2::new(w, h));
        for (y, row) in rows.iter().enumerate() {
            for (x, &v) in row.iter().enumerate() {
                data[Index2::new(x as i32, y as i32)] = v;
            }
        }
        Heatmap {
            y_min: 0,
            y_max: 0,
            x_min: 0,
            x_max: 0,
            z_min: 0,
            z_max: 255,
            timestamp: 0,
            data,
        }
    }

    #[test]
    fn all_background_yields_no_contacts() {
        // Raw bytes at `z_max`: normalized signal is 0 everywhere.
        let heatmap = heatmap_from_rows(&[&[255, 255, 255], &[255, 255, 255], &[255, 255, 255]]);
        let mut proc = BasicProcessor::new(BasicConfig { pressure_threshold: 10.0 / 255.0 });
        assert!(proc.process(&heatmap).is_empty());
    }

    #[test]
    fn single_saturated_cell_is_one_contact_at_that_cell() {
        // Raw byte 0 at the contact cell (strongest possible press), 255
        // (background) everywhere else.
        let heatmap = heatmap_from_rows(&[&[255, 255, 255], &[255, 0, 255], &[255, 255, 255]]);
        let mut proc = BasicProcessor::new(BasicConfig { pressure_threshold: 10.0 / 255.0 });
        let points = proc.process(&heatmap);
        assert_eq!(points.len(), 1);
        assert!((points[0].mean.x - 1.0).abs() < 1e-6);
        assert!((points[0].mean.y - 1.0).abs() < 1e-6);
        assert!(!points[0].palm);
    }

    #[test]
    fn two_separated_blobs_yield_two_contacts() {
        let heatmap = heatmap_from_rows(&[&[55, 255, 255, 255, 55], &[255, 255, 255, 255, 255]]);
        let mut proc = BasicProcessor::new(BasicConfig { pressure_threshold: 10.0 / 255.0 });
        let points = proc.process(&heatmap);
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn large_flat_plateau_does_not_overflow_the_call_stack() {
        let w = 200i32;
        let h = 200i32;
        let mut data: Image<u8> = Image::new(Index2::new(w, h));
        data.fill(55);
        let heatmap = Heatmap {
            y_min: 0,
            y_max: 0,
            x_min: 0,
            x_max: 0,
            z_min: 0,
            z_max: 255,
            timestamp: 0,
            data,
        };
        let mut proc = BasicProcessor::new(BasicConfig { pressure_threshold: 10.0 / 255.0 });
        let points = proc.process(&heatmap);
        assert_eq!(points.len(), 1);
    }
}
