//! Decimal arithmetic utilities for score and capital calculations.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Safe division that returns zero if divisor is zero and saturates on
/// overflow.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        return Decimal::ZERO;
    }
    numerator.checked_div(denominator).unwrap_or(
        if numerator.is_sign_negative() == denominator.is_sign_negative() {
            Decimal::MAX
        } else {
            Decimal::MIN
        },
    )
}

/// Clamp a value into `[lo, hi]`.
pub fn clamp_decimal(value: Decimal, lo: Decimal, hi: Decimal) -> Decimal {
    value.max(lo).min(hi)
}

/// Express `part` as a percentage of `whole` (0-100 scale).
pub fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    safe_div(part, whole).saturating_mul(dec!(100))
}

/// Convert a percentage (e.g. 25 = 25%) into a fraction of `base`.
pub fn fraction_of(percent: Decimal, base: Decimal) -> Decimal {
    (percent / dec!(100)).saturating_mul(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_div_zero_denominator() {
        assert_eq!(safe_div(dec!(10), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(safe_div(dec!(10), dec!(4)), dec!(2.5));
    }

    #[test]
    fn test_overflow_saturates() {
        assert_eq!(safe_div(Decimal::MAX, dec!(0.5)), Decimal::MAX);
        assert_eq!(safe_div(Decimal::MAX, dec!(-0.5)), Decimal::MIN);
        assert_eq!(percent_of(Decimal::MAX, Decimal::ONE), Decimal::MAX);
        assert_eq!(fraction_of(dec!(200), Decimal::MAX), Decimal::MAX);
    }

    #[test]
    fn test_clamp_decimal() {
        assert_eq!(clamp_decimal(dec!(120), dec!(0), dec!(100)), dec!(100));
        assert_eq!(clamp_decimal(dec!(-3), dec!(0), dec!(100)), dec!(0));
        assert_eq!(clamp_decimal(dec!(42.5), dec!(0), dec!(100)), dec!(42.5));
    }

    #[test]
    fn test_percentages() {
        assert_eq!(percent_of(dec!(3), dec!(4)), dec!(75));
        assert_eq!(percent_of(dec!(3), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(fraction_of(dec!(25), dec!(50000)), dec!(12500));
    }
}
