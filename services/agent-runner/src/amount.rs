//! Amount handling utilities for token decimals

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::address::Address;

/// Token metadata
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
}

/// Convert UI amount (human readable) to raw amount (u128)
///
/// # Safety
/// - Validates amount is non-negative
/// - Checks for overflow (amount must fit in a 96-bit decimal mantissa)
/// - Uses integer arithmetic only
///
/// Raw amounts are u128 rather than u64 because an 18-decimal token
/// balance overflows u64 above ~18.4 whole units.
pub fn to_raw_amount(ui_amount: Decimal, decimals: u8) -> anyhow::Result<u128> {
    if ui_amount < Decimal::ZERO {
        return Err(anyhow::anyhow!("Amount cannot be negative: {}", ui_amount));
    }

    let multiplier = Decimal::from(10u64.pow(decimals as u32));
    let raw = ui_amount.checked_mul(multiplier).ok_or_else(|| {
        anyhow::anyhow!(
            "Amount {} with {} decimals overflows the raw range",
            ui_amount,
            decimals
        )
    })?;

    let raw_u128 = raw.trunc().to_u128().ok_or_else(|| {
        anyhow::anyhow!(
            "Amount {} with {} decimals is not representable as raw units",
            ui_amount,
            decimals
        )
    })?;

    if raw_u128 == 0 && ui_amount > Decimal::ZERO {
        return Err(anyhow::anyhow!(
            "Amount {} too small for {} decimals (rounds to 0)",
            ui_amount,
            decimals
        ));
    }

    Ok(raw_u128)
}

/// Convert raw amount (u128) to UI amount (human readable)
pub fn from_raw_amount(raw_amount: u128, decimals: u8) -> anyhow::Result<Decimal> {
    let raw = i128::try_from(raw_amount)
        .map_err(|_| anyhow::anyhow!("Raw amount {} out of range", raw_amount))?;
    Decimal::try_from_i128_with_scale(raw, decimals as u32)
        .map_err(|e| anyhow::anyhow!("Raw amount {} not representable: {}", raw_amount, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_raw_amount() {
        // 1 stable unit = 1_000_000 raw (6 decimals)
        let amount = Decimal::from(1);
        assert_eq!(to_raw_amount(amount, 6).unwrap(), 1_000_000);

        // 1 gold unit = 10^18 raw (18 decimals)
        assert_eq!(to_raw_amount(amount, 18).unwrap(), 1_000_000_000_000_000_000);

        // 0.5 gold
        let half = Decimal::from_str_exact("0.5").unwrap();
        assert_eq!(to_raw_amount(half, 18).unwrap(), 500_000_000_000_000_000);

        // Too small (rounds to 0)
        let tiny = Decimal::from_str_exact("0.0000001").unwrap();
        assert!(to_raw_amount(tiny, 6).is_err());

        // Negative
        let neg = Decimal::from(-1);
        assert!(to_raw_amount(neg, 6).is_err());
    }

    #[test]
    fn test_from_raw_amount() {
        assert_eq!(from_raw_amount(1_000_000, 6).unwrap(), Decimal::from(1));
        assert_eq!(
            from_raw_amount(500_000_000_000_000_000, 18).unwrap(),
            Decimal::from_str_exact("0.5").unwrap()
        );
    }

    #[test]
    fn test_round_trip_above_u64() {
        // 20 gold units at 18 decimals does not fit in u64
        let amount = Decimal::from(20);
        let raw = to_raw_amount(amount, 18).unwrap();
        assert!(raw > u64::MAX as u128);
        assert_eq!(from_raw_amount(raw, 18).unwrap(), amount);
    }
}
