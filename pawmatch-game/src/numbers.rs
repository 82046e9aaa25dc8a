//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Clamp a f64 to the u64 range and truncate, returning 0 for non-finite values.
#[must_use]
pub fn clamp_f64_to_u64(value: f64) -> u64 {
    if !value.is_finite() {
        return if value == f64::INFINITY { u64::MAX } else { 0 };
    }
    let max = cast::<u64, f64>(u64::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(0.0, max);
    cast::<f64, u64>(clamped).unwrap_or(u64::MAX)
}

/// Convert a u64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(f64::MAX)
}

/// Integer percentage of `part` in `whole`, rounded down; 0 when `whole` is 0.
#[must_use]
pub fn percent_of(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let pct = u64::from(part) * 100 / u64::from(whole);
    u32::try_from(pct).unwrap_or(u32::MAX)
}

/// Number of items covered by `pct` percent of `len`, rounded up.
#[must_use]
pub const fn ceil_share(len: usize, pct: usize) -> usize {
    let scaled = len.saturating_mul(pct);
    let share = scaled.div_ceil(100);
    if share > len { len } else { share }
}

/// Convert a collection length into a u64 byte multiplier.
#[must_use]
pub fn len_to_u64(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}
