//! DFT stylus decoder: recovers continuous position, pressure, and
//! button/eraser state from per-row DFT bin samples.

use core_protocol::{DftFrameKind, DftRow, StylusDftData, StylusInput, MAX_PRESSURE};

const POSITION_MIN_AMP: f64 = 50.0;
const POSITION_MIN_MAG: u16 = 2000;
const BUTTON_MIN_MAG: u16 = 1000;
const FREQ_MIN_MAG: u32 = 10_000;
const POSITION_EXP: f64 = -0.7;

/// `v` clamped to `[lo, hi]`, propagating `NaN` through unchanged rather than
/// std's `f64::clamp` (which discards a NaN `self` via `f64::max`/`min`).
fn clamp_propagating_nan(v: f64, lo: f64, hi: f64) -> f64 {
    if v < lo {
        lo
    } else if hi < v {
        hi
    } else {
        v
    }
}

/// Sub-pixel bin offset within `row`, or NaN if the row has no usable signal.
/// The center component is assumed to carry the peak amplitude; if its
/// neighbor on one side reads exactly zero (edge of the sensor), the window
/// shifts one bin inward and the allowed offset range extends the other way.
fn interpolate_position(row: &DftRow) -> f64 {
    let mut maxi = row.center();
    let mut mind = -0.5;
    let mut maxd = 0.5;

    let left = row.components[maxi - 1];
    let right = row.components[maxi + 1];
    if left.real == 0 && left.imag == 0 {
        maxi += 1;
        mind = -1.0;
    } else if right.real == 0 && right.imag == 0 {
        maxi -= 1;
        maxd = 1.0;
    }

    let center = row.components[maxi];
    let amp = ((center.real * center.real + center.imag * center.imag) as f64).sqrt();
    if amp < POSITION_MIN_AMP {
        return f64::NAN;
    }

    let sin = center.real as f64 / amp;
    let cos = center.imag as f64 / amp;
    let lo = row.components[maxi - 1];
    let hi = row.components[maxi + 1];
    let mut x = [
        sin * lo.real as f64 + cos * lo.imag as f64,
        amp,
        sin * hi.real as f64 + cos * hi.imag as f64,
    ];
    for v in x.iter_mut() {
        *v = v.powf(POSITION_EXP);
    }

    if x[0] + x[2] <= 2.0 * x[1] {
        return f64::NAN;
    }

    let d = (x[0] - x[2]) / (2.0 * (x[0] - 2.0 * x[1] + x[2]));
    row.first as f64 + maxi as f64 + clamp_propagating_nan(d, mind, maxd)
}

/// Sub-row frequency estimate across three adjacent rows around the
/// strongest combined magnitude, via Jacobsen's modified quadratic
/// estimator. Every component in a row shares phase with its neighbors (by
/// construction of the sensor), so components can be summed directly.
fn interpolate_frequency(dft_x: &[DftRow], dft_y: &[DftRow]) -> f64 {
    let n = dft_x.len().min(dft_y.len());
    if n < 3 {
        return f64::NAN;
    }

    let mut maxi = 0usize;
    let mut maxm: u32 = 0;
    for i in 0..n {
        let m = dft_x[i].magnitude as u32 + dft_y[i].magnitude as u32;
        if m > maxm {
            maxm = m;
            maxi = i;
        }
    }
    if maxm < 2 * FREQ_MIN_MAG {
        return f64::NAN;
    }

    let mut mind = -0.5;
    let mut maxd = 0.5;
    if maxi < 1 {
        maxi = 1;
        mind = -1.0;
    } else if maxi > n - 2 {
        maxi = n - 2;
        maxd = 1.0;
    }

    let mut real = [0i64; 3];
    let mut imag = [0i64; 3];
    for (i, slot) in (0..3).enumerate() {
        let row_idx = maxi + slot - 1;
        for j in 0..core_protocol::DFT_NUM_COMPONENTS {
            real[i] += dft_x[row_idx].components[j].real as i64 + dft_y[row_idx].components[j].real as i64;
            imag[i] += dft_x[row_idx].components[j].imag as i64 + dft_y[row_idx].components[j].imag as i64;
        }
    }

    let ra = (real[0] - real[2]) as f64;
    let rb = (2 * real[1] - real[0] - real[2]) as f64;
    let ia = (imag[0] - imag[2]) as f64;
    let ib = (2 * imag[1] - imag[0] - imag[2]) as f64;
    let d = (ra * rb + ia * ib) / (rb * rb + ib * ib);

    maxi as f64 + clamp_propagating_nan(d, mind, maxd)
}

/// Decodes a stream of `StylusDftData` frames from one stylus device into
/// `StylusInput` events. Holds the phase reference captured on the last
/// position sample (for the button/eraser phase comparison) and the
/// deferred rubber-end toggle (see [`StylusDecoder::process`]).
pub struct StylusDecoder {
    invert_x: bool,
    invert_y: bool,
    input: StylusInput,
    rubber: bool,
    set_rubber: bool,
    real: i64,
    imag: i64,
}

impl StylusDecoder {
    pub fn new(invert_x: bool, invert_y: bool) -> Self {
        Self {
            invert_x,
            invert_y,
            input: StylusInput::default(),
            rubber: false,
            set_rubber: false,
            real: 0,
            imag: 0,
        }
    }

    /// Process one DFT frame, returning an event to emit (if any).
    pub fn process(&mut self, data: &StylusDftData) -> Option<StylusInput> {
        if self.set_rubber {
            self.input.rubber = self.rubber;
            self.set_rubber = false;
        }

        match data.kind {
            DftFrameKind::Position => self.process_position(data),
            DftFrameKind::Button => self.process_button(data),
            DftFrameKind::Pressure => self.process_pressure(data),
        }
    }

    /// Emits one final event clearing proximity, or `None` if the stylus was
    /// already out of range.
    fn stop_stylus(&mut self) -> Option<StylusInput> {
        if !self.input.proximity {
            return None;
        }
        self.input.proximity = false;
        self.input.contact = false;
        self.input.button = false;
        self.input.rubber = false;
        self.input.pressure = 0.0;
        Some(self.input)
    }

    fn process_position(&mut self, data: &StylusDftData) -> Option<StylusInput> {
        let (Some(row_x), Some(row_y)) = (data.dft_x.first(), data.dft_y.first()) else {
            return self.stop_stylus();
        };
        if data.num_cols == 0
            || data.num_rows == 0
            || row_x.magnitude <= POSITION_MIN_MAG
            || row_y.magnitude <= POSITION_MIN_MAG
        {
            return self.stop_stylus();
        }

        let center = row_x.center();
        self.real = row_x.components[center].real as i64 + row_y.components[center].real as i64;
        self.imag = row_x.components[center].imag as i64 + row_y.components[center].imag as i64;

        let x = interpolate_position(row_x);
        let y = interpolate_position(row_y);
        if x.is_nan() || y.is_nan() {
            return self.stop_stylus();
        }

        let mut nx = x / (data.num_cols - 1) as f64;
        let mut ny = y / (data.num_rows - 1) as f64;
        if self.invert_x {
            nx = 1.0 - nx;
        }
        if self.invert_y {
            ny = 1.0 - ny;
        }

        self.input.proximity = true;
        self.input.x = nx.clamp(0.0, 1.0) as f32;
        self.input.y = ny.clamp(0.0, 1.0) as f32;
        Some(self.input)
    }

    fn process_button(&mut self, data: &StylusDftData) -> Option<StylusInput> {
        let (Some(row_x), Some(row_y)) = (data.dft_x.first(), data.dft_y.first()) else {
            return None;
        };

        if row_x.magnitude > BUTTON_MIN_MAG && row_y.magnitude > BUTTON_MIN_MAG {
            let center = row_x.center();
            let rx = row_x.components[center].real as i64 + row_y.components[center].real as i64;
            let ix = row_x.components[center].imag as i64 + row_y.components[center].imag as i64;
            let phase = self.real * rx + self.imag * ix;
            self.input.button = phase < 0;
            self.rubber = phase > 0;
        } else {
            self.input.button = false;
            self.rubber = false;
        }

        // Toggling rubber mid-proximity misbehaves downstream, so force a
        // proximity-off report first and apply the new state on the frame
        // after (see the `set_rubber` check at the top of `process`).
        if self.rubber != self.input.rubber {
            self.set_rubber = true;
            return self.stop_stylus();
        }
        None
    }

    fn process_pressure(&mut self, data: &StylusDftData) -> Option<StylusInput> {
        let n = data.dft_x.len().min(data.dft_y.len());
        let raw = interpolate_frequency(&data.dft_x, &data.dft_y);
        let rows = n as f64;
        let scaled = if rows > 1.0 {
            (rows - 1.0 - raw) * MAX_PRESSURE as f64 / (rows - 1.0)
        } else {
            f64::NAN
        };

        if scaled > 1.0 && !scaled.is_nan() {
            self.input.contact = true;
            self.input.pressure = scaled.min(MAX_PRESSURE as f64).trunc() as f32;
        } else {
            self.input.contact = false;
            self.input.pressure = 0.0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_protocol::DftComponent;

    fn row(first: u16, magnitude: u16, center_real: i32, center_imag: i32) -> DftRow {
        let mut components = [DftComponent::default(); core_protocol::DFT_NUM_COMPONENTS];
        components[4] = DftComponent { real: center_real, imag: center_imag };
        components[3] = DftComponent { real: center_real / 2, imag: center_imag / 2 };
        components[5] = DftComponent { real: center_real / 3, imag: center_imag / 3 };
        DftRow { first, magnitude, components }
    }

    fn position_frame(num_cols: u16, num_rows: u16) -> StylusDftData {
        StylusDftData {
            kind: DftFrameKind::Position,
            timestamp: 0,
            num_cols,
            num_rows,
            dft_x: vec![row(0, 3000, 100, 0)],
            dft_y: vec![row(0, 3000, 0, 100)],
        }
    }

    #[test]
    fn weak_signal_yields_no_proximity() {
        let mut decoder = StylusDecoder::new(false, false);
        let mut data = position_frame(100, 100);
        data.dft_x[0].magnitude = 10;
        data.dft_y[0].magnitude = 10;
        assert!(decoder.process(&data).is_none());
    }

    #[test]
    fn strong_centered_signal_reports_proximity() {
        let mut decoder = StylusDecoder::new(false, false);
        let data = position_frame(100, 100);
        let event = decoder.process(&data).expect("strong signal should report proximity");
        assert!(event.proximity);
        assert!(event.x >= 0.0 && event.x <= 1.0);
        assert!(event.y >= 0.0 && event.y <= 1.0);
    }

    #[test]
    fn losing_proximity_after_being_in_range_emits_one_final_event() {
        let mut decoder = StylusDecoder::new(false, false);
        let data = position_frame(100, 100);
        decoder.process(&data).expect("first frame establishes proximity");

        let mut lost = data.clone();
        lost.dft_x[0].magnitude = 10;
        lost.dft_y[0].magnitude = 10;
        let event = decoder.process(&lost).expect("transition emits a final event");
        assert!(!event.proximity);
        assert_eq!(event.pressure, 0.0);

        assert!(decoder.process(&lost).is_none());
    }

    #[test]
    fn pressure_below_threshold_is_not_a_contact() {
        let mut decoder = StylusDecoder::new(false, false);
        let data = StylusDftData {
            kind: DftFrameKind::Pressure,
            timestamp: 0,
            num_cols: 0,
            num_rows: 0,
            dft_x: vec![row(0, 0, 0, 0); 4],
            dft_y: vec![row(0, 0, 0, 0); 4],
        };
        assert!(decoder.process(&data).is_none());
        assert!(!decoder.input.contact);
    }
}
