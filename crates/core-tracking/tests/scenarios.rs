//! End-to-end tracking scenarios spanning several consecutive frames, per
//! the testable-property scenarios for cross-frame contact tracking.

use core_math::{Mat2s, Vec2};
use core_protocol::TouchPoint;
use core_tracking::{Cone, TouchManager};

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
fn two_finger_pinch_keeps_stable_indices_across_the_whole_sequence() {
    let mut mgr = TouchManager::new(10, false, false, false, true, 0.1, Vec::new());

    let drift = [
        (10.0, 10.0, 90.0, 90.0),
        (15.0, 15.0, 85.0, 85.0),
        (20.0, 20.0, 80.0, 80.0),
        (25.0, 25.0, 75.0, 75.0),
        (30.0, 30.0, 70.0, 70.0),
    ];

    for (i, &(ax, ay, bx, by)) in drift.iter().enumerate() {
        let out = mgr.process(&[point(ax, ay, false), point(bx, by, false)], 100.0, 100.0);
        assert_eq!(out[0].index, 0, "frame {i}: first contact kept index 0");
        assert_eq!(out[1].index, 1, "frame {i}: second contact kept index 1");
    }

    let out = mgr.process(&[point(30.0, 30.0, false), point(70.0, 70.0, false)], 100.0, 100.0);
    let active = out.iter().filter(|t| t.active && !t.palm).count();
    assert_eq!(active, 2, "final frame still reports both contacts");
}

#[test]
fn ghosting_single_drop_is_carried_forward_then_reappears_with_its_index() {
    let mut mgr = TouchManager::new(10, false, false, false, true, 0.1, Vec::new());

    mgr.process(&[point(10.0, 10.0, false), point(90.0, 90.0, false)], 100.0, 100.0);
    mgr.process(&[point(10.0, 10.0, false), point(90.0, 90.0, false)], 100.0, 100.0);

    // Frame 3: the second contact is missing.
    let frame3 = mgr.process(&[point(10.0, 10.0, false)], 100.0, 100.0);
    let ghost = frame3
        .iter()
        .find(|t| t.index == 1)
        .expect("ghosted slot is carried forward for one frame");
    assert_eq!(ghost.instability, 1);
    assert!(ghost.active);

    // Frame 4: it comes back, keeping its original index.
    let frame4 = mgr.process(&[point(10.0, 10.0, false), point(90.0, 90.0, false)], 100.0, 100.0);
    let revived = frame4
        .iter()
        .find(|t| t.tracked && t.index == 1)
        .expect("revived contact keeps index 1");
    assert!(revived.active);
}

#[test]
fn instability_accrual_over_four_frames_drops_the_slot_on_the_fifth() {
    let mut mgr = TouchManager::new(10, false, false, false, true, 0.01, Vec::new());

    // First frame seeds the slot at a fixed position.
    mgr.process(&[point(50.0, 50.0, false)], 100.0, 100.0);

    // Jitter the position every frame by more than the tight stability
    // threshold so `instability` increments instead of resetting.
    for step in 1..=4 {
        let jitter = step as f32 * 5.0;
        mgr.process(&[point(50.0 + jitter, 50.0, false)], 100.0, 100.0);
    }

    // Fifth frame: the unstable slot should have been evicted from `last`
    // before the distance matrix was built, so this contact gets a fresh
    // assignment rather than matching the old, now-dropped slot.
    let out = mgr.process(&[point(50.0, 50.0, false)], 100.0, 100.0);
    assert_eq!(out[0].index, 0);
}

#[test]
fn palm_lands_then_pen_arrives_and_the_touch_manager_vetoes_it() {
    let cone = Cone::new(45.0, 2000.0);
    let mut mgr = TouchManager::new(10, false, false, true, true, 0.1, vec![cone]);

    // The pen is already resting at the sensor's center; anchor the cone
    // there before any palm shows up.
    mgr.cones_mut()[0].update_position(0.5, 0.5);

    // A large contact lands to the pen's right, already flagged `palm` by
    // the upstream extraction stage (e.g. on aspect ratio). Processing it
    // points the cone's direction toward increasing x.
    let out = mgr.process(&[point(60.0, 50.0, true)], 100.0, 100.0);
    assert!(out.iter().any(|t| t.palm));

    // A second, unrelated contact further along that same direction arrives
    // un-flagged; the cone check should veto it as palm.
    let out = mgr.process(&[point(70.0, 50.0, false)], 100.0, 100.0);
    let vetoed = out.iter().any(|t| t.palm);
    assert!(vetoed, "a contact trailing the pen's pointing direction is marked palm by the cone check");
}
