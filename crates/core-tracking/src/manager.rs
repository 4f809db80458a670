//! Cross-frame contact tracking: normalization, nearest-neighbor slot
//! assignment, stability filtering, and palm-cone veto.

use core_protocol::{TouchInput, TouchPoint};

use crate::cone::Cone;

/// Frames in a row with a large eigenvalue delta before a slot is dropped.
pub const INSTABILITY_THRESHOLD: u8 = 3;

/// Sentinel distance used to invalidate a row/column in the assignment
/// matrix once its pair has been bound, so it can't be picked again.
const DISTANCE_INVALID: f64 = 1_073_741_824.0; // 1 << 30

pub struct TouchManager {
    max_contacts: usize,
    invert_x: bool,
    invert_y: bool,
    stylus_cone: bool,
    touch_stability: bool,
    stability_threshold: f32,

    touching: bool,
    inputs: Vec<TouchInput>,
    last: Vec<TouchInput>,
    last_touch_cnt: usize,
    distances: Vec<f64>,

    cones: Vec<Cone>,
}

impl TouchManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        max_contacts: usize,
        invert_x: bool,
        invert_y: bool,
        stylus_cone: bool,
        touch_stability: bool,
        stability_threshold: f32,
        cones: Vec<Cone>,
    ) -> Self {
        let last = (0..max_contacts).map(|i| TouchInput::new(i as u8)).collect();
        let inputs = (0..max_contacts).map(|i| TouchInput::new(i as u8)).collect();
        Self {
            max_contacts,
            invert_x,
            invert_y,
            stylus_cone,
            touch_stability,
            stability_threshold,
            touching: false,
            inputs,
            last,
            last_touch_cnt: 0,
            distances: vec![0.0; max_contacts * max_contacts],
            cones,
        }
    }

    pub fn cones(&self) -> &[Cone] {
        &self.cones
    }

    pub fn cones_mut(&mut self) -> &mut [Cone] {
        &mut self.cones
    }

    /// Process one frame's worth of extracted contacts into a stable slot
    /// table. `width`/`height` are the sensor's pixel dimensions: each point
    /// is normalized to `[0,1]` by dividing by them before anything else.
    pub fn process(&mut self, contacts: &[TouchPoint], width: f32, height: f32) -> &[TouchInput] {
        let count = contacts.len().min(self.max_contacts);
        let diagonal = width.hypot(height);

        // Partition contacts[0..count] into non-palm (front, in original
        // order) and palm (back, reverse order of discovery) — an explicit
        // two-pointer rewrite of the original's aliased `i--`/`palm_cnt++`
        // single-pass partition; it produces the identical placement.
        let mut front = 0usize;
        let mut back = count;

        for src in contacts.iter().take(count) {
            let slot = if src.palm {
                back -= 1;
                back
            } else {
                let slot = front;
                front += 1;
                slot
            };

            let mut x = src.mean.x / width;
            let mut y = src.mean.y / height;
            if self.invert_x {
                x = 1.0 - x;
            }
            if self.invert_y {
                y = 1.0 - y;
            }

            let eigen = src.cov.eigen();
            let s1 = eigen.w[0].sqrt();
            let s2 = eigen.w[1].sqrt();
            let d1 = 4.0 * s1 / diagonal;
            let d2 = 4.0 * s2 / diagonal;

            let v1 = eigen.v[0];
            let mut angle = std::f32::consts::FRAC_PI_2 - v1.x.atan2(v1.y);
            if angle < 0.0 {
                angle += std::f32::consts::PI;
            }
            if angle > std::f32::consts::PI {
                angle -= std::f32::consts::PI;
            }

            let input = &mut self.inputs[slot];
            input.x = x;
            input.y = y;
            input.major = d1.max(d2);
            input.minor = d1.min(d2);
            input.orientation = angle / std::f32::consts::PI * 180.0;
            input.ev1 = eigen.w[0];
            input.ev2 = eigen.w[1];
            input.palm = src.palm;
            input.index = if src.palm { 0 } else { slot as u8 };
            input.active = true;
            input.tracked = false;
            input.instability = 0;
        }

        for i in count..self.max_contacts {
            self.inputs[i] = TouchInput::new(i as u8);
        }

        let mut actual_cnt = front;

        if self.touching {
            self.track(&mut actual_cnt);
        }

        if self.stylus_cone {
            for i in 0..count {
                if self.inputs[i].palm {
                    let palm = self.inputs[i];
                    self.update_cones(&palm);
                }
            }

            let mut i = 0usize;
            while i < actual_cnt {
                if !self.inputs[i].palm && self.check_cones(&self.inputs[i]) {
                    self.inputs[i].palm = true;
                    if i != actual_cnt - 1 {
                        self.inputs.swap(i, actual_cnt - 1);
                    }
                    actual_cnt -= 1;
                }
                i += 1;
            }
        }

        self.touching = actual_cnt > 0;
        std::mem::swap(&mut self.inputs, &mut self.last);
        self.last_touch_cnt = actual_cnt;
        &self.last
    }

    fn track(&mut self, touch_cnt: &mut usize) {
        let mut last_touch_cnt = self.last_touch_cnt;

        // Evict slots that have been unstable for too long before matching.
        let mut j = 0usize;
        while j < last_touch_cnt {
            if self.last[j].instability >= INSTABILITY_THRESHOLD {
                if j != last_touch_cnt - 1 {
                    self.last.swap(j, last_touch_cnt - 1);
                    last_touch_cnt -= 1;
                    continue;
                }
                last_touch_cnt -= 1;
                continue;
            }
            j += 1;
        }
        self.last_touch_cnt = last_touch_cnt;

        for i in 0..*touch_cnt {
            for j in 0..last_touch_cnt {
                let dx = 100.0 * (self.inputs[i].x as f64 - self.last[j].x as f64);
                let dy = 100.0 * (self.inputs[i].y as f64 - self.last[j].y as f64);
                self.distances[i * last_touch_cnt + j] = dx.hypot(dy);
            }
        }

        let pairs = (*touch_cnt).min(last_touch_cnt);
        let mut index_used: u16 = 0;

        for _ in 0..pairs {
            let window = &self.distances[..*touch_cnt * last_touch_cnt];
            let (idx, _) = window
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.partial_cmp(b.1).expect("distances are never NaN"))
                .expect("pairs > 0 implies a nonempty window");

            let i = idx / last_touch_cnt;
            let j = idx % last_touch_cnt;

            self.inputs[i].tracked = true;
            self.inputs[i].index = self.last[j].index;
            index_used |= 1 << self.inputs[i].index;
            self.inputs[i].instability = self.last[j].instability;

            if self.touch_stability {
                let dev1 = self.inputs[i].ev1 - self.last[j].ev1;
                let dev2 = self.inputs[i].ev2 - self.last[j].ev2;
                if dev1 < self.stability_threshold && dev2 < self.stability_threshold {
                    self.inputs[i].instability = 0;
                } else {
                    self.inputs[i].instability += 1;
                }
            }

            for x in 0..last_touch_cnt {
                self.distances[i * last_touch_cnt + x] = DISTANCE_INVALID;
            }
            for x in 0..*touch_cnt {
                self.distances[x * last_touch_cnt + j] = DISTANCE_INVALID;
            }
        }

        if *touch_cnt > last_touch_cnt {
            for i in 0..*touch_cnt {
                if !self.inputs[i].tracked {
                    let mut index = 0u8;
                    while index_used & (1 << index) != 0 {
                        index += 1;
                    }
                    self.inputs[i].index = index;
                    index_used |= 1 << index;
                }
            }
        } else if *touch_cnt < last_touch_cnt {
            // Some fingers lifted: carry the unmatched previous contacts
            // forward for one frame (ghosting mitigation) rather than
            // dropping their slot immediately.
            for j in 0..last_touch_cnt {
                if index_used & (1 << self.last[j].index) != 0 {
                    continue;
                }
                for i in *touch_cnt..self.max_contacts {
                    if !self.inputs[i].active {
                        if i != *touch_cnt {
                            self.inputs.swap(*touch_cnt, i);
                        }
                        self.inputs[*touch_cnt] = self.last[j];
                        self.inputs[*touch_cnt].instability += 1;
                        *touch_cnt += 1;
                        break;
                    }
                }
            }
        }
    }

    fn update_cones(&mut self, palm: &TouchInput) {
        let mut closest = None;
        let mut best = f64::INFINITY;
        for (idx, cone) in self.cones.iter().enumerate() {
            if !cone.alive() || !cone.active() {
                continue;
            }
            let d = (cone.x() - palm.x as f64).hypot(cone.y() - palm.y as f64);
            if d < best {
                best = d;
                closest = Some(idx);
            }
        }
        if let Some(idx) = closest {
            self.cones[idx].update_direction(palm.x as f64, palm.y as f64);
        }
    }

    fn check_cones(&self, input: &TouchInput) -> bool {
        self.cones.iter().any(|c| c.check(input.x as f64, input.y as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_math::{Mat2s, Vec2};

    fn point(x: f32, y: f32, palm: bool) -> TouchPoint {
        TouchPoint {
            mean: Vec2::new(x, y),
            cov: Mat2s::new(1.0, 0.0, 1.0),
            scale: 100.0,
            confidence: 1.0,
            palm,
        }
    }

    #[test]
    fn single_contact_gets_index_zero_on_first_frame() {
        let mut mgr = TouchManager::new(10, false, false, false, true, 0.1, Vec::new());
        let out = mgr.process(&[point(50.0, 50.0, false)], 100.0, 100.0);
        assert_eq!(out[0].index, 0);
        assert!(out[0].active);
        assert!(!out[0].palm);
    }

    #[test]
    fn matching_contact_keeps_its_index_across_frames() {
        let mut mgr = TouchManager::new(10, false, false, false, true, 0.1, Vec::new());
        mgr.process(&[point(10.0, 10.0, false), point(90.0, 90.0, false)], 100.0, 100.0);
        let out = mgr.process(&[point(10.5, 10.5, false), point(90.5, 90.5, false)], 100.0, 100.0);
        assert_eq!(out[0].index, 0);
        assert_eq!(out[1].index, 1);
        assert!(out[0].tracked);
        assert!(out[1].tracked);
    }

    #[test]
    fn lifted_finger_is_carried_forward_with_instability() {
        let mut mgr = TouchManager::new(10, false, false, false, true, 0.1, Vec::new());
        mgr.process(&[point(10.0, 10.0, false), point(90.0, 90.0, false)], 100.0, 100.0);
        // Second contact missing this frame.
        let out = mgr.process(&[point(10.0, 10.0, false)], 100.0, 100.0);
        let ghost = out.iter().find(|i| i.index == 1).expect("ghosted slot retained");
        assert_eq!(ghost.instability, 1);
    }

    #[test]
    fn invert_x_flips_normalized_coordinate() {
        let mut mgr = TouchManager::new(10, true, false, false, true, 0.1, Vec::new());
        let out = mgr.process(&[point(20.0, 50.0, false)], 100.0, 100.0);
        assert!((out[0].x - 0.8).abs() < 1e-6);
    }
}
