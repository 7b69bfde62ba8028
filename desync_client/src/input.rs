//! Input handling.
//!
//! Converts held movement keys into the per-tick [`MovementInput`] the
//! controllers read, and derives the horizontal heading that input implies.

use desync_shared::entity::{InputFlags, MovementInput};

/// Sneaking scales directional input down to this fraction.
pub const SNEAK_MULTIPLIER: f32 = 0.3;

/// Turns held keys into movement magnitudes for a tick.
pub fn build_movement(keys: InputFlags) -> MovementInput {
    let axis = |pos: InputFlags, neg: InputFlags| -> f32 {
        let mut v = 0.0;
        if keys.contains(pos) {
            v += 1.0;
        }
        if keys.contains(neg) {
            v -= 1.0;
        }
        v
    };

    let mut forward = axis(InputFlags::FORWARD, InputFlags::BACK);
    let mut strafe = axis(InputFlags::LEFT, InputFlags::RIGHT);
    if keys.contains(InputFlags::SNEAK) {
        forward *= SNEAK_MULTIPLIER;
        strafe *= SNEAK_MULTIPLIER;
    }

    MovementInput {
        keys,
        forward,
        strafe,
    }
}

fn rounded(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Heading in radians the input moves toward, given the body yaw in degrees.
///
/// Yaw 0 faces +Z; the velocity for speed `s` is `(-sin(h) * s, cos(h) * s)`.
pub fn calc_move_yaw(yaw: f32, input: &MovementInput) -> f64 {
    let forward = rounded(input.forward);
    let strafe = rounded(input.strafe);

    let mut strafe_deg = 90.0 * strafe;
    strafe_deg *= if forward != 0.0 { forward * 0.5 } else { 1.0 };

    let mut heading = yaw - strafe_deg;
    if forward < 0.0 {
        heading -= 180.0;
    }
    (heading as f64).to_radians()
}
