//! Canonical decimal formatting and micros<->wire-string conversion at the
//! REST/WS boundary ("`f64` conversions happen only at REST/WS wire
//! boundaries... and is fallible").
//!
//! Grounded in the HyperLiquid-style `float_to_wire` convention: fixed
//! precision then strip trailing zeros, never scientific notation.

use fbt_core::{f64_to_micros, micros_to_f64, FbtError, PricingError};

/// Render integer micros as a canonical decimal string (up to 6 fractional
/// digits, no trailing zeros, never scientific notation).
pub fn micros_to_decimal_string(value: i64) -> String {
    let f = micros_to_f64(value);
    let s = format!("{f:.6}");
    let trimmed = s.trim_end_matches('0');
    let trimmed = trimmed.trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a venue decimal string into integer micros.
pub fn decimal_string_to_micros(s: &str) -> Result<i64, FbtError> {
    let f: f64 = s
        .parse()
        .map_err(|_| FbtError::DataError(format!("not a decimal: {s}")))?;
    f64_to_micros(f).map_err(|e: PricingError| FbtError::DataError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_unit_has_no_trailing_zeros() {
        assert_eq!(micros_to_decimal_string(100 * fbt_core::MICROS_PER_UNIT), "100");
    }

    #[test]
    fn fractional_value_keeps_significant_digits() {
        assert_eq!(micros_to_decimal_string(100_500_000), "100.5");
    }

    #[test]
    fn zero_is_zero_not_empty() {
        assert_eq!(micros_to_decimal_string(0), "0");
    }

    #[test]
    fn round_trip_is_stable() {
        let original = 12_345_678;
        let s = micros_to_decimal_string(original);
        let back = decimal_string_to_micros(&s).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn garbage_string_is_data_error() {
        assert!(decimal_string_to_micros("not-a-number").is_err());
    }
}
