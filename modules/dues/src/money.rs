//! Minor-unit currency helpers
//!
//! Amounts are carried as `i64` cents end to end. These helpers only convert
//! at the edges (CLI arguments, CSV export).

use crate::validation::ValidationError;

/// Parse a decimal string such as "150", "150.5" or "150.00" into cents.
pub fn parse_minor(input: &str) -> Result<i64, ValidationError> {
    let malformed = || ValidationError::MalformedAmount(input.to_string());
    let trimmed = input.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };

    if whole.is_empty()
        || fraction.len() > 2
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(malformed());
    }

    let whole: i64 = whole.parse().map_err(|_| malformed())?;
    let cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| malformed())? * 10,
        _ => fraction.parse().map_err(|_| malformed())?,
    };

    let value = whole
        .checked_mul(100)
        .and_then(|v| v.checked_add(cents))
        .ok_or_else(malformed)?;

    Ok(if negative { -value } else { value })
}

/// Render cents as a plain decimal string ("150.00")
pub fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minor() {
        assert_eq!(parse_minor("150"), Ok(15000));
        assert_eq!(parse_minor("150.5"), Ok(15050));
        assert_eq!(parse_minor("150.05"), Ok(15005));
        assert_eq!(parse_minor(" 0.99 "), Ok(99));
        assert_eq!(parse_minor("-2.10"), Ok(-210));
    }

    #[test]
    fn test_parse_minor_rejects_malformed() {
        for bad in ["", ".50", "1.234", "abc", "1,50", "1.-5", "99999999999999999999"] {
            assert!(parse_minor(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_format_minor() {
        assert_eq!(format_minor(15000), "150.00");
        assert_eq!(format_minor(5), "0.05");
        assert_eq!(format_minor(-210), "-2.10");
    }

    #[test]
    fn test_sum_of_thirds_has_no_drift() {
        // 3 × 33.33 stays exact in minor units
        let third = parse_minor("33.33").unwrap();
        assert_eq!(format_minor(third * 3), "99.99");
    }
}
