//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Floor a f64 and saturate it to the i64 range, returning 0 for non-finite values.
#[must_use]
pub fn floor_f64_to_i64(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let min = cast::<i64, f64>(i64::MIN).unwrap_or(f64::MIN);
    let max = cast::<i64, f64>(i64::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(min, max).floor();
    cast::<f64, i64>(clamped).unwrap_or_else(|| saturate(clamped))
}

/// Round a f64 and saturate it to the i64 range, returning 0 for non-finite values.
#[must_use]
pub fn round_f64_to_i64(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    let min = cast::<i64, f64>(i64::MIN).unwrap_or(f64::MIN);
    let max = cast::<i64, f64>(i64::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(min, max).round();
    cast::<f64, i64>(clamped).unwrap_or_else(|| saturate(clamped))
}

/// `i64::MAX as f64` rounds up to 2^63, one past the range.
const fn saturate(value: f64) -> i64 {
    if value > 0.0 { i64::MAX } else { i64::MIN }
}

/// Convert i64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn i64_to_f64(value: i64) -> f64 {
    cast::<i64, f64>(value).unwrap_or(0.0)
}

/// Scale an integer reward by a multiplier, rounding to the nearest unit.
#[must_use]
pub fn scale_amount(amount: i64, multiplier: f64) -> i64 {
    round_f64_to_i64(i64_to_f64(amount) * multiplier)
}

/// Replace NaN/infinite time steps with zero and negative steps with zero.
#[must_use]
pub const fn sanitize_dt(dt: f64) -> f64 {
    if dt.is_finite() { dt.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_handles_non_finite() {
        assert_eq!(floor_f64_to_i64(f64::NAN), 0);
        assert_eq!(floor_f64_to_i64(f64::INFINITY), 0);
        assert_eq!(floor_f64_to_i64(2.9), 2);
        assert_eq!(floor_f64_to_i64(-0.5), -1);
    }

    #[test]
    fn rounders_cover_ranges() {
        assert_eq!(round_f64_to_i64(1.6), 2);
        assert_eq!(round_f64_to_i64(f64::NAN), 0);
        assert_eq!(round_f64_to_i64(i64_to_f64(i64::MAX) * 2.0), i64::MAX);
        assert_eq!(round_f64_to_i64(i64_to_f64(i64::MIN) * 2.0), i64::MIN);
    }

    #[test]
    fn floor_saturates_at_the_upper_bound() {
        assert_eq!(floor_f64_to_i64(i64_to_f64(i64::MAX)), i64::MAX);
        assert_eq!(floor_f64_to_i64(1e300), i64::MAX);
        assert_eq!(floor_f64_to_i64(-1e300), i64::MIN);
    }

    #[test]
    fn huge_multipliers_cap_instead_of_vanishing() {
        assert_eq!(scale_amount(i64::MAX, 4.0), i64::MAX);
        assert_eq!(scale_amount(5, 1e300), i64::MAX);
    }

    #[test]
    fn scale_amount_rounds() {
        assert_eq!(scale_amount(10, 1.25), 13);
        assert_eq!(scale_amount(10, 0.0), 0);
    }

    #[test]
    fn sanitize_dt_rejects_garbage() {
        assert!(sanitize_dt(f64::NAN).abs() < f64::EPSILON);
        assert!(sanitize_dt(-3.0).abs() < f64::EPSILON);
        assert!((sanitize_dt(1.5) - 1.5).abs() < f64::EPSILON);
    }
}
