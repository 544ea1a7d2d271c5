//! Calibration stamp generation and raw-value normalization.
//!
//! Each installation fixes a random calibration stamp at setup time. The
//! upstream API scales raw values by the matching divisor, so the stamp is
//! what turns the wire value back into nSv/h:
//!
//!   divisor = 1001 - stamp
//!   value   = raw_value / divisor
//!
//! With the stamp held to [20, 999] the divisor stays in [2, 981] and the
//! division is always well-defined. Stamp range is enforced at configure
//! time (`stations::configure`), never here.

use rand::Rng;

use crate::model::NormalizedReading;

/// Smallest valid calibration stamp.
pub const STAMP_MIN: u16 = 20;

/// Largest valid calibration stamp.
pub const STAMP_MAX: u16 = 999;

/// The divisor is this base minus the stamp.
pub const DIVISOR_BASE: u16 = 1001;

/// Draws a calibration stamp in [[`STAMP_MIN`], [`STAMP_MAX`]].
///
/// The randomness source is passed in so setup code and tests control
/// determinism; the stamp is drawn once per installation and never
/// recalculated without a configuration change.
pub fn generate_stamp<R: Rng>(rng: &mut R) -> u16 {
    rng.gen_range(STAMP_MIN..=STAMP_MAX)
}

/// The normalization divisor for a stamp.
pub fn divisor_for(stamp: u16) -> f64 {
    debug_assert!((STAMP_MIN..=STAMP_MAX).contains(&stamp));
    f64::from(DIVISOR_BASE - stamp)
}

/// Applies the calibration divisor to a raw reading.
///
/// Pure: identical inputs always yield the identical reading.
pub fn normalize(raw_value: f64, stamp: u16) -> NormalizedReading {
    let divisor = divisor_for(stamp);
    NormalizedReading {
        value: raw_value / divisor,
        raw_value,
        stamp,
        divisor,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
