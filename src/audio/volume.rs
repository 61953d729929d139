//! Volume ramps.
//!
//! Volume changes are stepped one percent at a time so the change is a short
//! fade instead of an audible pop.

pub const MAX_VOLUME_PERCENT: u8 = 100;

/// Percent values to apply, in order, to go from `from` to `to`.
///
/// `from` itself is excluded, `to` is the last element. Equal endpoints
/// produce no steps.
pub fn ramp_steps(from: u8, to: u8) -> Vec<u8> {
    if to < from {
        (to..from).rev().collect()
    } else {
        (from + 1..=to).collect()
    }
}

pub fn to_percent(volume: f32) -> u8 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u8
}

pub fn from_percent(percent: u8) -> f32 {
    f32::from(percent.min(MAX_VOLUME_PERCENT)) / 100.0
}
