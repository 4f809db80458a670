//! Directional palm-rejection cone anchored at a stylus tip's last position.

use std::time::{Duration, Instant};

const ACTIVE_WINDOW: Duration = Duration::from_millis(300);
const DIRECTION_HALF_LIFE_MS: f64 = 1000.0;
const DIRECTION_EPS: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct Cone {
    position_update: Option<Instant>,
    direction_update: Option<Instant>,
    x: f64,
    y: f64,
    dx: f64,
    dy: f64,
    cos_angle: f64,
    distance: f64,
}

impl Cone {
    pub fn new(angle_degrees: f64, distance: f64) -> Self {
        Self {
            position_update: None,
            direction_update: None,
            x: 0.0,
            y: 0.0,
            dx: 0.0,
            dy: 0.0,
            cos_angle: angle_degrees.to_radians().cos(),
            distance,
        }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    /// Whether this cone has ever received a position update.
    pub fn alive(&self) -> bool {
        self.position_update.is_some()
    }

    /// Whether the last position update was within the last 300ms.
    pub fn active(&self) -> bool {
        self.position_update.is_some_and(|t| t.elapsed() < ACTIVE_WINDOW)
    }

    pub fn update_position(&mut self, rx: f64, ry: f64) {
        self.x = rx;
        self.y = ry;
        self.position_update = Some(Instant::now());
    }

    /// Time-weighted exponential smoothing of the direction toward `(rx, ry)`,
    /// with a 1-second half-life.
    pub fn update_direction(&mut self, rx: f64, ry: f64) {
        let now = Instant::now();
        let weight = match self.direction_update {
            Some(prev) => 2f64.powf(-(now.duration_since(prev).as_millis() as f64) / DIRECTION_HALF_LIFE_MS),
            None => 0.0,
        };

        let d = (self.x - rx).hypot(self.y - ry);
        let drx = (rx - self.x) / (d + DIRECTION_EPS);
        let dry = (ry - self.y) / (d + DIRECTION_EPS);

        self.dx = weight * self.dx + drx;
        self.dy = weight * self.dy + dry;

        let norm = self.dx.hypot(self.dy) + DIRECTION_EPS;
        self.dx /= norm;
        self.dy /= norm;

        self.direction_update = Some(now);
    }

    /// Whether `(rx, ry)` falls inside this cone's rejection region.
    ///
    /// This compares `hypot(dx, dy)` — the stored direction vector, which
    /// `update_direction` keeps renormalized to ~unit length — against
    /// `distance`, rather than the separation `hypot(rx-x, ry-y)`. That
    /// reads like a transcription slip from the separation check one would
    /// expect here, but it's reproduced as observed rather than corrected.
    pub fn check(&self, rx: f64, ry: f64) -> bool {
        if !self.active() {
            return false;
        }
        let dir_hypot = self.dx.hypot(self.dy);
        if dir_hypot > self.distance {
            return false;
        }
        (rx - self.x) * self.dx + (ry - self.y) * self.dy > self.cos_angle * dir_hypot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cone_is_not_alive_before_first_position_update() {
        let cone = Cone::new(30.0, 1600.0);
        assert!(!cone.alive());
        assert!(!cone.active());
    }

    #[test]
    fn cone_becomes_active_after_position_update() {
        let mut cone = Cone::new(30.0, 1600.0);
        cone.update_position(0.5, 0.5);
        assert!(cone.alive());
        assert!(cone.active());
    }

    #[test]
    fn check_fails_while_inactive() {
        let cone = Cone::new(30.0, 1600.0);
        assert!(!cone.check(0.5, 0.5));
    }

    #[test]
    fn check_passes_for_point_in_the_pointing_direction() {
        let mut cone = Cone::new(30.0, 1600.0);
        cone.update_position(0.5, 0.5);
        // Point the cone toward increasing x.
        cone.update_direction(0.6, 0.5);
        assert!(cone.check(0.7, 0.5));
        assert!(!cone.check(0.3, 0.5));
    }
}
