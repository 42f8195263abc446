//! Common numeric and time helpers for growth_core.

/// Number of seconds in one hour.
pub const SECS_PER_HOUR: f64 = 3600.0;

/// Fitness assigned to an undefined doubling time; never wins a comparison.
pub const FITNESS_SENTINEL: f64 = 999.9;

/// Round to `decimals` places, for journal texts and OD comparisons.
#[inline]
pub fn round_to(x: f64, decimals: i32) -> f64 {
    let p = 10f64.powi(decimals);
    (x * p).round() / p
}

/// Hours to whole seconds, saturating; negative and NaN map to 0.
#[inline]
pub fn hours_to_secs(h: f64) -> u64 {
    if h.is_finite() && h > 0.0 {
        (h * SECS_PER_HOUR).round() as u64
    } else {
        0
    }
}

/// Replace an undefined or non-positive fitness with the sentinel.
#[inline]
pub fn sanitize_fitness(f: f64) -> f64 {
    if f.is_finite() && f > 0.0 { f } else { FITNESS_SENTINEL }
}

/// 64-bit FNV-1a, stable across builds (used for config fingerprints).
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        h ^= u64::from(*b);
        h = h.wrapping_mul(0x0100_0000_01b3);
    }
    h
}
