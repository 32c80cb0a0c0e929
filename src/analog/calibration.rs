//! # Calibration Module
//!
//! Converts raw 12-bit converter samples into the values reported to the
//! host.
//!
//! ## Re-centering
//!
//! A stick rarely rests at the exact middle of the converter range. Each
//! axis carries a signed `center_offset` so that its resting point maps to
//! `RANGE / 2`. Samples below the resting point are scaled from
//! `[min, rest]` onto `[0, RANGE / 2]`, samples above it from `[rest, max]`
//! onto `[RANGE / 2, RANGE)`. The scale factor is a fixed-point ratio with
//! four decimal digits and every division truncates toward zero, so the
//! output curve is reproducible to the unit.
//!
//! The result is clamped to `[1, RANGE - 2]`. Some emulators overflow on the
//! two extreme values.
//!
//! ## Deadzone
//!
//! Values strictly inside `(center - flat, center + flat)` snap to `center`,
//! where `center` is the middle of the native range (2047).
//!
//! ## Usage
//!
//! ```
//! use arcade_joystick::analog::calibration::{calibrate, static_offset};
//!
//! let offset = static_offset(374, 3418);
//! assert_eq!(offset, -151);
//!
//! // The resting point lands in the deadzone
//! assert_eq!(calibrate(1897, offset, 374, 3418, 384, false), 2047);
//!
//! // Full deflection stays inside the clamp
//! assert_eq!(calibrate(3418, offset, 374, 3418, 384, false), 4094);
//! assert_eq!(calibrate(374, offset, 374, 3418, 384, false), 1);
//! ```

/// Size of the native converter range (12 bits).
pub const RANGE: i32 = 4096;

/// Smallest reported value.
pub const OUTPUT_MIN: i32 = 1;

/// Largest reported value.
pub const OUTPUT_MAX: i32 = RANGE - 2;

/// Largest native sample.
pub const NATIVE_MAX: i32 = RANGE - 1;

/// Resting point the offsets are measured against.
const REST_REFERENCE: i32 = RANGE / 2 - 1;

/// Fixed-point scale of the re-centering ratio.
const RATIO_SCALE: i64 = 10_000;

/// Applies the full calibration curve to one raw sample.
///
/// # Arguments
///
/// * `raw` - Native sample in `[0, RANGE)`
/// * `center_offset` - Resting point relative to `RANGE / 2`
/// * `min`, `max` - Calibrated travel of the stick
/// * `flat` - Deadzone half-width
/// * `reverse` - Mirror the sample before anything else
///
/// # Returns
///
/// The calibrated value in `[OUTPUT_MIN, OUTPUT_MAX]`.
#[must_use]
pub fn calibrate(raw: u16, center_offset: i32, min: u16, max: u16, flat: u16, reverse: bool) -> i32 {
    let sample = orient(raw, reverse);
    let centered = offset_center(sample, center_offset, min, max);
    apply_deadzone(centered, 0, NATIVE_MAX, flat)
}

/// Mirrors a sample when `reverse` is set.
///
/// A sample of 0 mirrors to `RANGE`, one past the native maximum. The clamp
/// in [`offset_center`] brings it back.
#[must_use]
pub fn orient(raw: u16, reverse: bool) -> i32 {
    let raw = i32::from(raw);
    if reverse {
        (RANGE - raw).abs()
    } else {
        raw
    }
}

/// Re-centers a sample around `RANGE / 2` and clamps it.
#[must_use]
pub fn offset_center(sample: i32, center_offset: i32, min: u16, max: u16) -> i32 {
    let center = i64::from(RANGE / 2);
    let rest = center + i64::from(center_offset);
    let sample = i64::from(sample);

    let corrected = if sample < rest {
        let range = rest - i64::from(min);
        if range != 0 {
            let ratio = RATIO_SCALE * center / range;
            (sample - i64::from(min)) * ratio / RATIO_SCALE
        } else {
            sample
        }
    } else {
        let range = i64::from(max) - rest;
        if range != 0 {
            let ratio = RATIO_SCALE * center / range;
            center + (sample - rest) * ratio / RATIO_SCALE
        } else {
            sample
        }
    };

    corrected.clamp(i64::from(OUTPUT_MIN), i64::from(OUTPUT_MAX)) as i32
}

/// Snaps values near the middle of `[min, max]` to the middle.
#[must_use]
pub fn apply_deadzone(value: i32, min: i32, max: i32, flat: u16) -> i32 {
    let center = (max + min) / 2;
    let flat = i32::from(flat);
    if value > center - flat && value < center + flat {
        center
    } else {
        value
    }
}

/// Offset derived from the first sample when auto-centering.
#[must_use]
pub fn auto_center_offset(first_sample: i32) -> i32 {
    first_sample - REST_REFERENCE
}

/// Offset derived from the configured travel when not auto-centering.
#[must_use]
pub fn static_offset(min: u16, max: u16) -> i32 {
    let (min, max) = (i32::from(min), i32::from(max));
    (max - min) / 2 + min - REST_REFERENCE
}
