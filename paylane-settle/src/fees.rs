//! Settlement fee schedule.

use crate::config::FeeConfig;
use crate::error::SettleError;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

/// Computes the fee recorded for each settlement detail.
///
/// `fee = flat + gas_used / gas_divisor`, in display token units, clamped
/// into `[0, gross]` so the resulting net amount can never go negative.
/// Both parameters come from [`FeeConfig`]; there is no hidden constant.
#[derive(Debug, Clone)]
pub struct FeeSchedule {
    flat: Decimal,
    gas_divisor: Decimal,
}

impl FeeSchedule {
    /// Builds a schedule from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::Config`] when the divisor is not positive or
    /// the flat fee is negative.
    pub fn new(config: &FeeConfig) -> Result<Self, SettleError> {
        if config.gas_divisor <= Decimal::ZERO {
            return Err(SettleError::Config(format!(
                "fee gas_divisor must be positive, got {}",
                config.gas_divisor
            )));
        }
        if config.flat < Decimal::ZERO {
            return Err(SettleError::Config(format!(
                "flat fee must not be negative, got {}",
                config.flat
            )));
        }
        Ok(Self {
            flat: config.flat,
            gas_divisor: config.gas_divisor,
        })
    }

    /// Derives the fee for one settlement from the chain-specific outcome
    /// details (`gas_used`, when the chain reports it) and the gross
    /// amount being settled.
    #[must_use]
    pub fn fee_for(&self, details: &Map<String, Value>, gross: Decimal) -> Decimal {
        let gas_used = details.get("gas_used").and_then(Value::as_u64).unwrap_or(0);
        let fee = self.flat + Decimal::from(gas_used) / self.gas_divisor;
        fee.clamp(Decimal::ZERO, gross.max(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    fn schedule(flat: Decimal, divisor: Decimal) -> FeeSchedule {
        FeeSchedule::new(&FeeConfig {
            flat,
            gas_divisor: divisor,
        })
        .unwrap()
    }

    #[test]
    fn fee_combines_flat_and_gas_components() {
        let fees = schedule(dec!(0.10), dec!(10000));
        let mut details = Map::new();
        details.insert("gas_used".to_owned(), Value::from(50_000u64));
        // 0.10 + 50000 / 10000 = 5.10
        assert_eq!(fees.fee_for(&details, dec!(100)), dec!(5.10));
    }

    #[test]
    fn fee_without_gas_detail_is_flat_only() {
        let fees = schedule(dec!(0.25), dec!(10000));
        assert_eq!(fees.fee_for(&Map::new(), dec!(100)), dec!(0.25));
    }

    #[test]
    fn fee_is_clamped_to_gross() {
        let fees = schedule(dec!(0), dec!(1));
        let mut details = Map::new();
        details.insert("gas_used".to_owned(), Value::from(1_000_000u64));
        assert_eq!(fees.fee_for(&details, dec!(2)), dec!(2));
        assert_eq!(fees.fee_for(&details, dec!(0)), dec!(0));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(FeeSchedule::new(&FeeConfig {
            flat: dec!(0),
            gas_divisor: dec!(0),
        })
        .is_err());
        assert!(FeeSchedule::new(&FeeConfig {
            flat: dec!(-1),
            gas_divisor: dec!(10000),
        })
        .is_err());
    }
}
