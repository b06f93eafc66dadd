use alloy_primitives::{Address, U256};
use log::info;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A fee rate with a human-readable label.
///
/// Rates are fractions: `0.01` is one percent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCategory {
    pub rate: Decimal,
    pub label: String,
    pub enabled: bool,
}

impl FeeCategory {
    pub fn new(rate: Decimal, label: impl Into<String>) -> Self {
        Self {
            rate,
            label: label.into(),
            enabled: true,
        }
    }

    /// The fee charged on `amount`, rounded down. Disabled categories
    /// charge nothing.
    ///
    /// # Examples
    ///
    /// ```
    /// use alloy_primitives::U256;
    /// use rust_decimal_macros::dec;
    /// use settlement_engine::collaborators::fee_config::FeeCategory;
    ///
    /// let category = FeeCategory::new(dec!(0.01), "default");
    /// assert_eq!(category.fee_on(U256::from(1_000u64)), U256::from(10u64));
    /// ```
    pub fn fee_on(&self, amount: U256) -> U256 {
        if !self.enabled || self.rate <= Decimal::ZERO {
            return U256::ZERO;
        }
        let mantissa = match u128::try_from(self.rate.mantissa()) {
            Ok(m) => U256::from(m),
            Err(_) => return U256::ZERO,
        };
        let scale = U256::from(10u64).pow(U256::from(self.rate.scale()));
        amount.saturating_mul(mantissa) / scale
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeConfigError {
    #[error("{caller} may not change fee categories")]
    Unauthorized { caller: Address },

    #[error("fee rate {rate} is outside [0, {limit}]")]
    RateOutOfBounds { rate: Decimal, limit: Decimal },
}

/// Read access to fee categories by id.
pub trait FeeConfigurator {
    fn fee_category(&self, id: u8) -> Option<FeeCategory>;

    /// Upper bound on any single category's rate.
    fn total_limit(&self) -> Decimal;
}

/// Fee categories kept in memory, editable by one owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryFeeConfigurator {
    owner: Address,
    total_limit: Decimal,
    categories: BTreeMap<u8, FeeCategory>,
}

impl InMemoryFeeConfigurator {
    pub fn new(owner: Address, total_limit: Decimal) -> Self {
        Self {
            owner,
            total_limit,
            categories: BTreeMap::new(),
        }
    }

    /// A 5% limit with a 1% category 0 labelled "default".
    pub fn with_defaults(owner: Address) -> Self {
        let mut config = Self::new(owner, dec!(0.05));
        config
            .categories
            .insert(0, FeeCategory::new(dec!(0.01), "default"));
        config
    }

    pub fn set_fee_category(
        &mut self,
        caller: &Address,
        id: u8,
        rate: Decimal,
        label: impl Into<String>,
        enabled: bool,
    ) -> Result<(), FeeConfigError> {
        if *caller != self.owner {
            return Err(FeeConfigError::Unauthorized { caller: *caller });
        }
        if rate < Decimal::ZERO || rate > self.total_limit {
            return Err(FeeConfigError::RateOutOfBounds {
                rate,
                limit: self.total_limit,
            });
        }
        let label = label.into();
        info!("fee category {} set to {} ({}) enabled={}", id, rate, label, enabled);
        self.categories.insert(
            id,
            FeeCategory {
                rate,
                label,
                enabled,
            },
        );
        Ok(())
    }
}

impl FeeConfigurator for InMemoryFeeConfigurator {
    fn fee_category(&self, id: u8) -> Option<FeeCategory> {
        self.categories.get(&id).cloned()
    }

    fn total_limit(&self) -> Decimal {
        self.total_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InMemoryFeeConfigurator::with_defaults(Address::repeat_byte(1));
        let category = config.fee_category(0).unwrap();
        assert_eq!(category.rate, dec!(0.01));
        assert_eq!(category.label, "default");
        assert_eq!(config.total_limit(), dec!(0.05));
        assert!(config.fee_category(1).is_none());
    }

    #[test]
    fn test_rate_bounded_by_limit() {
        let owner = Address::repeat_byte(1);
        let mut config = InMemoryFeeConfigurator::with_defaults(owner);
        assert_eq!(
            config.set_fee_category(&owner, 1, dec!(0.06), "greedy", true),
            Err(FeeConfigError::RateOutOfBounds {
                rate: dec!(0.06),
                limit: dec!(0.05)
            })
        );
        assert!(config
            .set_fee_category(&owner, 1, dec!(-0.01), "negative", true)
            .is_err());
        config
            .set_fee_category(&owner, 1, dec!(0.05), "max", true)
            .unwrap();
    }

    #[test]
    fn test_only_owner_edits() {
        let mut config = InMemoryFeeConfigurator::with_defaults(Address::repeat_byte(1));
        let stranger = Address::repeat_byte(2);
        assert_eq!(
            config.set_fee_category(&stranger, 0, dec!(0), "free", true),
            Err(FeeConfigError::Unauthorized { caller: stranger })
        );
    }

    #[test]
    fn test_fee_rounds_down_and_respects_enabled() {
        let mut category = FeeCategory::new(dec!(0.003), "swap");
        assert_eq!(category.fee_on(U256::from(999u64)), U256::from(2u64));
        category.enabled = false;
        assert_eq!(category.fee_on(U256::from(999u64)), U256::ZERO);
    }
}
