//! Decimal price strings to integer base units.
//!
//! Prices travel as decimal strings (`"0.001"`) and settle as integer token
//! base units (`1000` for a 6-decimal asset). Conversion is string-parse
//! then integer-multiply; binary floating point is never involved.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Errors converting a price string to base units.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("invalid decimal amount")]
    InvalidFormat,
    #[error("negative amount is not allowed")]
    Negative,
    #[error("amount does not fit the asset's base units")]
    Overflow,
}

/// Checks that a price string is a well-formed, non-negative decimal.
pub fn validate_price(price: &str) -> Result<(), PriceError> {
    let parsed = Decimal::from_str(price).map_err(|_| PriceError::InvalidFormat)?;
    if parsed.is_sign_negative() {
        return Err(PriceError::Negative);
    }
    Ok(())
}

/// Converts a decimal price string to integer base units for an asset with
/// the given number of decimals.
///
/// Fractional digits beyond `decimals` are truncated toward zero. The math
/// is mantissa/scale integer arithmetic throughout; `"1.5"` with 6 decimals
/// is exactly `1_500_000`.
pub fn price_to_base_units(price: &str, decimals: u8) -> Result<u64, PriceError> {
    let parsed = Decimal::from_str(price).map_err(|_| PriceError::InvalidFormat)?;
    if parsed.is_sign_negative() {
        return Err(PriceError::Negative);
    }
    let truncated = parsed.trunc_with_scale(decimals as u32);
    let mantissa =
        u64::try_from(truncated.mantissa().unsigned_abs()).map_err(|_| PriceError::Overflow)?;
    let multiplier = 10u64
        .checked_pow(decimals as u32 - truncated.scale())
        .ok_or(PriceError::Overflow)?;
    mantissa.checked_mul(multiplier).ok_or(PriceError::Overflow)
}
