use alloy_primitives::{Address, U256};
use std::str::FromStr;

/// Sentinel token address standing for the chain's native currency.
///
/// Native balances live in the same ledger as token balances, keyed by
/// this address, so every balance read and transfer in the engine goes
/// through one code path.
///
/// # Examples
///
/// ```
/// use settlement_engine::core::token::{is_native, NATIVE};
/// use alloy_primitives::Address;
///
/// assert!(is_native(&NATIVE));
/// assert!(!is_native(&Address::repeat_byte(0x11)));
/// ```
pub const NATIVE: Address = Address::ZERO;

/// Returns true if `token` is the native-currency sentinel.
pub fn is_native(token: &Address) -> bool {
    *token == NATIVE
}

/// Parse an amount written either in decimal or as a `0x`-prefixed hex string.
pub fn parse_amount(s: &str) -> Result<U256, String> {
    U256::from_str(s.trim()).map_err(|e| format!("invalid amount '{}': {}", s, e))
}

/// Serde adapter writing amounts as decimal strings.
///
/// Quote services emit amounts as decimal strings (`"5000000"`), which the
/// default hex encoding would misread.
pub mod amount_serde {
    use super::*;
    use serde::de::{self, Deserialize};

    pub fn serialize<S: serde::Serializer>(amount: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_amount(&raw).map_err(de::Error::custom)
    }
}
