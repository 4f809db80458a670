//! End-to-end stylus scenarios spanning several consecutive DFT frames.

use core_protocol::{DftComponent, DftFrameKind, DftRow, StylusDftData};
use core_stylus::StylusDecoder;

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

fn button_frame(real: i32, imag: i32) -> StylusDftData {
    StylusDftData {
        kind: DftFrameKind::Button,
        timestamp: 0,
        num_cols: 0,
        num_rows: 0,
        dft_x: vec![row(0, 2000, real, imag)],
        dft_y: vec![row(0, 2000, 0, 0)],
    }
}

#[test]
fn stylus_proximity_turns_on_then_off_across_the_frame_sequence() {
    let mut decoder = StylusDecoder::new(false, false);

    let on = decoder
        .process(&position_frame(100, 100))
        .expect("strong signal establishes proximity");
    assert!(on.proximity);

    // A couple more frames in range: proximity stays on, no spurious events
    // from unrelated fields.
    for _ in 0..2 {
        let event = decoder.process(&position_frame(100, 100));
        assert!(event.is_none() || event.unwrap().proximity);
    }

    let mut fading = position_frame(100, 100);
    fading.dft_x[0].magnitude = 5;
    fading.dft_y[0].magnitude = 5;
    let off = decoder
        .process(&fading)
        .expect("dropping below the position magnitude floor emits the final off event");
    assert!(!off.proximity);
    assert!(!off.contact);
    assert_eq!(off.pressure, 0.0);

    // Staying out of range afterward emits nothing further.
    assert!(decoder.process(&fading).is_none());
}

#[test]
fn rubber_end_toggle_forces_a_proximity_off_frame_before_taking_effect() {
    let mut decoder = StylusDecoder::new(false, false);

    // Establish a phase reference with a position frame.
    decoder.process(&position_frame(100, 100)).expect("position frame establishes proximity");

    // A button frame whose phase matches the reference flips `rubber`.
    let toggled = decoder
        .process(&button_frame(100, 0))
        .expect("a rubber flip forces an immediate proximity-off event");
    assert!(!toggled.proximity, "the flip frame clears proximity rather than reporting it live");

    // The next frame picks up the deferred `rubber` state.
    let resumed = decoder
        .process(&position_frame(100, 100))
        .expect("proximity resumes on the following frame");
    assert!(resumed.rubber, "the deferred rubber toggle takes effect one frame later");
}
