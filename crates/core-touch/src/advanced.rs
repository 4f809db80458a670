//! Full-fidelity touch processor: Gaussian denoise, structure-tensor
//! incoherence, Hessian ridge response, component labeling and scoring,
//! weighted distance transform, and per-contact Gaussian fitting.

use core_fit::GaussianFit;
use core_labels::label;
use core_math::{Image, Index2, Kernel, Mat2s, Vec2};
use core_protocol::{Heatmap, TouchPoint};

use crate::normalize_pixel;
use crate::stats::ComponentStats;
use crate::wdt;

#[derive(Debug, Clone, Copy)]
pub struct AdvancedConfig {
    /// Local-maxima / labeling threshold is this fraction of the objective
    /// field's global maximum for the frame.
    pub obj_threshold_ratio: f32,
    /// Minimum `ComponentStats::score()` for a component to be kept.
    pub component_min_score: f32,
    pub palm_area: f32,
    pub palm_aspect: f32,
    pub palm_pressure: f32,
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            obj_threshold_ratio: 0.1,
            component_min_score: 0.05,
            palm_area: 400.0,
            palm_aspect: 4.0,
            palm_pressure: 12.0,
        }
    }
}

pub struct AdvancedProcessor {
    config: AdvancedConfig,
    fitter: GaussianFit,

    kern_pp: Kernel<5, 5>,
    kern_st: Kernel<5, 5>,
    kern_hs: Kernel<5, 5>,

    size: Index2,

    raw: Image<f32>,
    preprocessed: Image<f32>,
    gx: Image<f32>,
    gy: Image<f32>,

    st_xx_raw: Image<f32>,
    st_xy_raw: Image<f32>,
    st_yy_raw: Image<f32>,
    st_xx: Image<f32>,
    st_xy: Image<f32>,
    st_yy: Image<f32>,
    incoherence: Image<f32>,

    hs_xx_raw: Image<f32>,
    hs_xy_raw: Image<f32>,
    hs_yy_raw: Image<f32>,
    hs_xx: Image<f32>,
    hs_xy: Image<f32>,
    hs_yy: Image<f32>,
    ridge: Image<f32>,

    obj: Image<f32>,
    labels: Image<u16>,
    owner: Image<u16>,
}

impl AdvancedProcessor {
    pub fn new(config: AdvancedConfig) -> Self {
        let empty = Index2::new(0, 0);
        Self {
            config,
            fitter: GaussianFit::new(),
            kern_pp: Kernel::gaussian(1.0),
            kern_st: Kernel::gaussian(1.5),
            kern_hs: Kernel::gaussian(1.5),
            size: empty,
            raw: Image::new(empty),
            preprocessed: Image::new(empty),
            gx: Image::new(empty),
            gy: Image::new(empty),
            st_xx_raw: Image::new(empty),
            st_xy_raw: Image::new(empty),
            st_yy_raw: Image::new(empty),
            st_xx: Image::new(empty),
            st_xy: Image::new(empty),
            st_yy: Image::new(empty),
            incoherence: Image::new(empty),
            hs_xx_raw: Image::new(empty),
            hs_xy_raw: Image::new(empty),
            hs_yy_raw: Image::new(empty),
            hs_xx: Image::new(empty),
            hs_xy: Image::new(empty),
            hs_yy: Image::new(empty),
            ridge: Image::new(empty),
            obj: Image::new(empty),
            labels: Image::new(empty),
            owner: Image::new(empty),
        }
    }

    fn resize_all(&mut self, size: Index2) {
        if size == self.size {
            return;
        }
        self.size = size;
        self.raw.resize(size);
        self.preprocessed.resize(size);
        self.gx.resize(size);
        self.gy.resize(size);
        self.st_xx_raw.resize(size);
        self.st_xy_raw.resize(size);
        self.st_yy_raw.resize(size);
        self.st_xx.resize(size);
        self.st_xy.resize(size);
        self.st_yy.resize(size);
        self.incoherence.resize(size);
        self.hs_xx_raw.resize(size);
        self.hs_xy_raw.resize(size);
        self.hs_yy_raw.resize(size);
        self.hs_xx.resize(size);
        self.hs_xy.resize(size);
        self.hs_yy.resize(size);
        self.ridge.resize(size);
        self.obj.resize(size);
        self.labels.resize(size);
        self.owner.resize(size);
    }

    pub fn process(&mut self, heatmap: &Heatmap) -> Vec<TouchPoint> {
        let size = heatmap.data.size();
        self.resize_all(size);

        for (dst, &src) in self.raw.iter_mut().zip(heatmap.data.iter()) {
            *dst = normalize_pixel(src, heatmap.z_min, heatmap.z_max);
        }
        self.kern_pp.convolve(&self.raw, &mut self.preprocessed);

        self.compute_gradient();
        self.compute_structure_tensor();
        self.compute_hessian_ridge();

        for i in 0..self.obj.size().span() as usize {
            self.obj[i] = (self.ridge[i] * (1.0 - self.incoherence[i])).max(0.0);
        }

        let global_max = self.obj.iter().copied().fold(0.0f32, f32::max);
        if global_max <= 0.0 {
            return Vec::new();
        }

        let maxima = self.find_local_maxima();
        let threshold = global_max * self.config.obj_threshold_ratio;
        let n_labels = label::<4, f32>(&mut self.labels, &self.obj, threshold);
        if n_labels == 0 {
            return Vec::new();
        }

        let stats = self.component_stats(n_labels, &maxima);
        let accepted: Vec<bool> = (0..=n_labels as usize)
            .map(|l| l > 0 && stats[l].maxima > 0 && stats[l].score() >= self.config.component_min_score)
            .collect();

        let seeds: Vec<(usize, u16)> = maxima
            .iter()
            .enumerate()
            .filter(|(_, &(idx, _))| accepted[self.labels[idx] as usize])
            .map(|(seed_id, &(idx, _))| (idx, seed_id as u16))
            .collect();

        if seeds.is_empty() {
            return Vec::new();
        }

        wdt::run(&self.obj, &self.labels, &seeds, &mut self.owner);
        self.smooth_ownership();

        let counts = self.owner_pixel_counts(seeds.len());

        let mut points = Vec::new();
        for (seed_id, &(idx, _)) in maxima.iter().enumerate() {
            if !accepted[self.labels[idx] as usize] {
                continue;
            }
            let Some(point) = self.fit_point(idx, seed_id, &counts, &stats) else {
                continue;
            };
            points.push(point);
        }

        points
    }

    fn compute_gradient(&mut self) {
        let size = self.preprocessed.size();
        let width = size.x;
        let height = size.y;
        for y in 0..height {
            for x in 0..width {
                let xm = (x - 1).max(0);
                let xp = (x + 1).min(width - 1);
                let ym = (y - 1).max(0);
                let yp = (y + 1).min(height - 1);
                let gx = (self.preprocessed[Index2::new(xp, y)] - self.preprocessed[Index2::new(xm, y)]) * 0.5;
                let gy = (self.preprocessed[Index2::new(x, yp)] - self.preprocessed[Index2::new(x, ym)]) * 0.5;
                self.gx[Index2::new(x, y)] = gx;
                self.gy[Index2::new(x, y)] = gy;
            }
        }
    }

    fn compute_structure_tensor(&mut self) {
        for i in 0..self.gx.size().span() as usize {
            let gx = self.gx[i];
            let gy = self.gy[i];
            self.st_xx_raw[i] = gx * gx;
            self.st_xy_raw[i] = gx * gy;
            self.st_yy_raw[i] = gy * gy;
        }
        self.kern_st.convolve(&self.st_xx_raw, &mut self.st_xx);
        self.kern_st.convolve(&self.st_xy_raw, &mut self.st_xy);
        self.kern_st.convolve(&self.st_yy_raw, &mut self.st_yy);

        const EPS: f32 = 1e-6;
        for i in 0..self.st_xx.size().span() as usize {
            let m = Mat2s::new(self.st_xx[i], self.st_xy[i], self.st_yy[i]);
            let w = m.eigenvalues();
            self.incoherence[i] = w[1] / (w[0] + EPS);
        }
    }

    fn compute_hessian_ridge(&mut self) {
        let size = self.preprocessed.size();
        let width = size.x;
        let height = size.y;
        for y in 0..height {
            for x in 0..width {
                let xm = (x - 1).max(0);
                let xp = (x + 1).min(width - 1);
                let ym = (y - 1).max(0);
                let yp = (y + 1).min(height - 1);
                let c = self.preprocessed[Index2::new(x, y)];
                let fxx = self.preprocessed[Index2::new(xp, y)] - 2.0 * c + self.preprocessed[Index2::new(xm, y)];
                let fyy = self.preprocessed[Index2::new(x, yp)] - 2.0 * c + self.preprocessed[Index2::new(x, ym)];
                let fxy = (self.preprocessed[Index2::new(xp, yp)] - self.preprocessed[Index2::new(xp, ym)]
                    - self.preprocessed[Index2::new(xm, yp)]
                    + self.preprocessed[Index2::new(xm, ym)])
                    * 0.25;
                self.hs_xx_raw[Index2::new(x, y)] = fxx;
                self.hs_xy_raw[Index2::new(x, y)] = fxy;
                self.hs_yy_raw[Index2::new(x, y)] = fyy;
            }
        }
        self.kern_hs.convolve(&self.hs_xx_raw, &mut self.hs_xx);
        self.kern_hs.convolve(&self.hs_xy_raw, &mut self.hs_xy);
        self.kern_hs.convolve(&self.hs_yy_raw, &mut self.hs_yy);

        for i in 0..self.hs_xx.size().span() as usize {
            let h = Mat2s::new(self.hs_xx[i], self.hs_xy[i], self.hs_yy[i]);
            let w = h.eigenvalues();
            self.ridge[i] = (-w[1]).max(0.0);
        }
    }

    /// Pixels strictly greater than all present 8-neighbors and above a
    /// small floor; ties (equal values) can't both win since comparison is
    /// strict, so the lower linear index is scanned and wins first.
    fn find_local_maxima(&self) -> Vec<(usize, f32)> {
        let size = self.obj.size();
        let width = size.x as usize;
        let height = size.y as usize;
        let mut maxima = Vec::new();

        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                let v = self.obj[idx];
                if v <= 0.0 {
                    continue;
                }
                let mut is_max = true;
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        if nx < 0 || ny < 0 || nx as usize >= width || ny as usize >= height {
                            continue;
                        }
                        let nv = self.obj[ny as usize * width + nx as usize];
                        if nv > v {
                            is_max = false;
                        }
                    }
                }
                if is_max {
                    maxima.push((idx, v));
                }
            }
        }
        maxima
    }

    fn component_stats(&self, n_labels: u16, maxima: &[(usize, f32)]) -> Vec<ComponentStats> {
        let mut stats = vec![ComponentStats::default(); n_labels as usize + 1];
        for i in 0..self.labels.size().span() as usize {
            let l = self.labels[i] as usize;
            if l == 0 {
                continue;
            }
            stats[l].size += 1;
            stats[l].volume += self.obj[i];
            stats[l].incoherence += self.incoherence[i];
        }
        for s in stats.iter_mut().skip(1) {
            if s.size > 0 {
                s.incoherence /= s.size as f32;
            }
        }
        for &(idx, _) in maxima {
            let l = self.labels[idx] as usize;
            if l > 0 {
                stats[l].maxima += 1;
            }
        }
        stats
    }

    /// Single-pass majority smoothing: a foreground pixel disagreeing with
    /// 3 of its 4 neighbors' owner is reassigned to that majority owner.
    fn smooth_ownership(&mut self) {
        let size = self.owner.size();
        let width = size.x as usize;
        let height = size.y as usize;
        let mut next = self.owner.clone();

        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                if self.labels[idx] == 0 {
                    continue;
                }
                let mut counts: std::collections::HashMap<u16, u32> = std::collections::HashMap::new();
                let mut push = |ox: i32, oy: i32, counts: &mut std::collections::HashMap<u16, u32>| {
                    if ox < 0 || oy < 0 || ox as usize >= width || oy as usize >= height {
                        return;
                    }
                    let n = oy as usize * width + ox as usize;
                    if self.labels[n] == self.labels[idx] {
                        *counts.entry(self.owner[n]).or_insert(0) += 1;
                    }
                };
                push(x as i32 - 1, y as i32, &mut counts);
                push(x as i32 + 1, y as i32, &mut counts);
                push(x as i32, y as i32 - 1, &mut counts);
                push(x as i32, y as i32 + 1, &mut counts);

                if let Some((&best_owner, &best_count)) = counts.iter().max_by_key(|(_, &c)| c) {
                    if best_count >= 3 && best_owner != self.owner[idx] {
                        next[idx] = best_owner;
                    }
                }
            }
        }
        self.owner = next;
    }

    fn owner_pixel_counts(&self, n_seeds: usize) -> Vec<u32> {
        let mut counts = vec![0u32; n_seeds];
        for &o in self.owner.iter() {
            if (o as usize) < n_seeds {
                counts[o as usize] += 1;
            }
        }
        counts
    }

    fn fit_point(&self, idx: usize, seed_id: usize, counts: &[u32], stats: &[ComponentStats]) -> Option<TouchPoint> {
        let width = self.size.x;
        let center = Index2::new((idx as i32) % width, (idx as i32) / width);
        let fitted = self.fitter.fit(&self.raw, center)?;

        let eigen = fitted.cov.eigen();
        let area = counts[seed_id] as f32;
        let aspect: f64 = if eigen.w[1] > 0.0 { eigen.w[0] / eigen.w[1] } else { f64::INFINITY };

        let component_score = stats[self.labels[idx] as usize].score();
        let confidence = component_score.clamp(0.0, 1.0);

        let palm = area > self.config.palm_area
            || aspect as f32 > self.config.palm_aspect
            || (fitted.scale as f32) < self.config.palm_pressure;

        Some(TouchPoint {
            mean: Vec2::new(fitted.mean.x as f32, fitted.mean.y as f32),
            cov: fitted.cov.cast(),
            scale: fitted.scale as f32,
            confidence,
            palm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(data: Image<u8>) -> Heatmap {
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
        let size = Index2::new(30, 30);
        // Raw bytes at `z_max` normalize to 0 (no contact) everywhere.
        let mut data: Image<u8> = Image::new(size);
        data.fill(255);
        let mut proc = AdvancedProcessor::new(AdvancedConfig::default());
        assert!(proc.process(&wrap(data)).is_empty());
    }

    #[test]
    fn single_gaussian_blob_yields_one_contact() {
        let size = Index2::new(30, 30);
        let mut data: Image<u8> = Image::new(size);
        for y in 0..size.y {
            for x in 0..size.x {
                let dx = (x - 15) as f32;
                let dy = (y - 15) as f32;
                // A dip toward 0 at the center against a 255 background, so
                // the post-normalization signal peaks at the contact point.
                let v = 255.0 - 230.0 * (-(dx * dx + dy * dy) / (2.0 * 3.0 * 3.0)).exp();
                data[Index2::new(x, y)] = v as u8;
            }
        }
        let mut proc = AdvancedProcessor::new(AdvancedConfig::default());
        let points = proc.process(&wrap(data));
        assert_eq!(points.len(), 1);
        assert!((points[0].mean.x - 15.0).abs() < 1.0);
        assert!((points[0].mean.y - 15.0).abs() < 1.0);
    }
}
