//! Smallest-unit amount arithmetic.
//!
//! Amounts cross the wire as decimal strings ("0.10") and live in
//! memory as smallest-unit `u128` integers. No f64 anywhere in the
//! pipeline; rounding errors must not accumulate across thousands of
//! small payments.

use crate::error::TollgateError;

/// Parse a decimal amount string into smallest units.
///
/// Accepts an optional leading `$` ("$0.001", "0.01", "1"); any other
/// non-digit character is rejected, so "-5" and "1,000" fail rather
/// than silently parsing as 5 and 1000. Fractional digits beyond
/// `decimals` are truncated, matching how priced routes quote amounts.
pub fn parse_amount(amount: &str, decimals: u32) -> Result<u128, TollgateError> {
    let cleaned = amount.strip_prefix('$').unwrap_or(amount);
    if let Some(bad) = cleaned.chars().find(|c| !c.is_ascii_digit() && *c != '.') {
        return Err(TollgateError::Protocol(format!(
            "invalid amount '{amount}': unexpected character '{bad}'"
        )));
    }

    if cleaned.is_empty() || cleaned == "." {
        return Err(TollgateError::Protocol(format!(
            "invalid amount '{amount}': no numeric content"
        )));
    }

    let overflow = || TollgateError::Protocol(format!("invalid amount '{amount}': overflow"));
    let multiplier = 10u128
        .checked_pow(decimals)
        .ok_or_else(overflow)?;

    match cleaned.split_once('.') {
        Some((integer_part, fractional_part)) => {
            let integer: u128 = if integer_part.is_empty() {
                0
            } else {
                integer_part.parse().map_err(|e| {
                    TollgateError::Protocol(format!("invalid amount '{amount}': integer part: {e}"))
                })?
            };

            // Truncate the fractional part to `decimals` digits.
            let decimals = decimals as usize;
            let frac_str = if fractional_part.len() >= decimals {
                &fractional_part[..decimals]
            } else {
                fractional_part
            };

            let fractional: u128 = if frac_str.is_empty() {
                0
            } else {
                frac_str.parse().map_err(|e| {
                    TollgateError::Protocol(format!(
                        "invalid amount '{amount}': fractional part: {e}"
                    ))
                })?
            };

            // Scale up when fewer fractional digits were given.
            let scale = 10u128.pow((decimals - frac_str.len()) as u32);

            let whole = integer.checked_mul(multiplier).ok_or_else(overflow)?;
            let frac = fractional.checked_mul(scale).ok_or_else(overflow)?;
            whole.checked_add(frac).ok_or_else(overflow)
        }
        None => {
            let integer: u128 = cleaned.parse().map_err(|e| {
                TollgateError::Protocol(format!("invalid amount '{amount}': {e}"))
            })?;
            integer.checked_mul(multiplier).ok_or_else(overflow)
        }
    }
}

/// Format smallest units back into a decimal string.
///
/// Inverse of [`parse_amount`] up to trailing-zero trimming:
/// `format_amount(100000, 6)` is `"0.1"`, not `"0.100000"`.
pub fn format_amount(base_units: u128, decimals: u32) -> String {
    let multiplier = 10u128.pow(decimals);
    let whole = base_units / multiplier;
    let frac = base_units % multiplier;
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{frac:0>width$}", width = decimals as usize);
    format!("{whole}.{}", frac_str.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dollar_amount() {
        assert_eq!(parse_amount("$0.001", 6).unwrap(), 1000);
    }

    #[test]
    fn test_parse_numeric_amount() {
        assert_eq!(parse_amount("0.01", 6).unwrap(), 10_000);
    }

    #[test]
    fn test_parse_whole_number() {
        assert_eq!(parse_amount("1", 6).unwrap(), 1_000_000);
        assert_eq!(parse_amount("$100.50", 6).unwrap(), 100_500_000);
    }

    #[test]
    fn test_parse_smallest_unit() {
        assert_eq!(parse_amount("0.000001", 6).unwrap(), 1);
    }

    #[test]
    fn test_parse_truncates_beyond_decimals() {
        // 7 fractional digits -- truncated to 6
        assert_eq!(parse_amount("0.0000019", 6).unwrap(), 1);
    }

    #[test]
    fn test_parse_empty_fails() {
        assert!(parse_amount("$", 6).is_err());
        assert!(parse_amount("", 6).is_err());
        assert!(parse_amount(".", 6).is_err());
    }

    #[test]
    fn test_parse_rejects_stray_characters() {
        // Stripping these instead would turn "-5" into 5
        for bad in ["-5", "5-", "1,000", "0.1e3", " 1", "1 ", "0.1$", "$$1"] {
            let err = parse_amount(bad, 6).unwrap_err();
            assert!(
                matches!(err, TollgateError::Protocol(_)),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn test_parse_overflow_fails() {
        let huge = "9".repeat(40);
        assert!(parse_amount(&huge, 6).is_err());
    }

    #[test]
    fn test_format_trims_trailing_zeros() {
        assert_eq!(format_amount(100_000, 6), "0.1");
        assert_eq!(format_amount(1_000_000, 6), "1");
        assert_eq!(format_amount(100_500_000, 6), "100.5");
        assert_eq!(format_amount(1, 6), "0.000001");
        assert_eq!(format_amount(0, 6), "0");
    }

    #[test]
    fn test_roundtrip() {
        for s in ["0.1", "1", "100.5", "0.000001", "42.42"] {
            let base = parse_amount(s, 6).unwrap();
            assert_eq!(format_amount(base, 6), *s);
        }
    }
}
