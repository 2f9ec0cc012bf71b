//! Integer base-unit arithmetic.
//!
//! Amounts are carried as integer base units (1 native coin = 10^8 base
//! units) across the entire engine. Decimal strings only appear at the
//! edges (CLI wallet output, display), and the conversions here are exact;
//! no floating point is involved.

use thiserror::Error;

/// Base units per native coin.
pub const COIN: u64 = 100_000_000;

/// Number of decimal places in the coin denomination.
pub const DECIMALS: u32 = 8;

#[derive(Debug, Error)]
pub enum AmountError {
    #[error("invalid amount '{0}'")]
    Invalid(String),
    #[error("amount '{0}' has more than {DECIMALS} decimal places")]
    TooPrecise(String),
    #[error("amount '{0}' overflows")]
    Overflow(String),
}

/// Parse a decimal coin amount ("0.30", "12", "0.00000001") into base units.
pub fn parse_decimal(input: &str) -> Result<u64, AmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AmountError::Invalid(input.into()));
    }

    let (whole, frac) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };

    if whole.is_empty() && frac.is_empty() {
        return Err(AmountError::Invalid(input.into()));
    }
    if frac.len() > DECIMALS as usize {
        return Err(AmountError::TooPrecise(input.into()));
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| AmountError::Invalid(input.into()))?
    };

    let frac_base: u64 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<8}");
        padded
            .parse()
            .map_err(|_| AmountError::Invalid(input.into()))?
    };

    whole
        .checked_mul(COIN)
        .and_then(|w| w.checked_add(frac_base))
        .ok_or_else(|| AmountError::Overflow(input.into()))
}

/// Format base units as a decimal coin amount with trailing zeros trimmed.
pub fn format_base(base: u64) -> String {
    let whole = base / COIN;
    let frac = base % COIN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{frac:08}");
    let trimmed = frac_str.trim_end_matches('0');
    format!("{whole}.{trimmed}")
}

/// Format base units as a fixed eight-decimal string, the shape the wallet
/// CLI expects for send values.
pub fn format_base_fixed(base: u64) -> String {
    format!("{}.{:08}", base / COIN, base % COIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional() {
        assert_eq!(parse_decimal("0.30").unwrap(), 30_000_000);
        assert_eq!(parse_decimal("1").unwrap(), COIN);
        assert_eq!(parse_decimal("0.00000001").unwrap(), 1);
        assert_eq!(parse_decimal(".5").unwrap(), 50_000_000);
        assert_eq!(parse_decimal("12.34567891").unwrap(), 1_234_567_891);
    }

    #[test]
    fn rejects_excess_precision() {
        assert!(matches!(
            parse_decimal("0.000000001"),
            Err(AmountError::TooPrecise(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_decimal("").is_err());
        assert!(parse_decimal(".").is_err());
        assert!(parse_decimal("1.2.3").is_err());
        assert!(parse_decimal("abc").is_err());
    }

    #[test]
    fn rejects_overflow() {
        assert!(matches!(
            parse_decimal("999999999999999999999"),
            Err(AmountError::Invalid(_)) | Err(AmountError::Overflow(_))
        ));
    }

    #[test]
    fn formats_round_trip() {
        assert_eq!(format_base(30_000_000), "0.3");
        assert_eq!(format_base(COIN), "1");
        assert_eq!(format_base(1), "0.00000001");
        assert_eq!(format_base_fixed(30_000_000), "0.30000000");
    }
}
