use crate::core::token::NATIVE;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors raised by ledger movements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("{spender} may spend {allowance} of {token} from {owner}, needs {required}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        allowance: U256,
        required: U256,
    },
    #[error("{holder} holds {balance} of {token}, needs {required}")]
    InsufficientBalance {
        token: Address,
        holder: Address,
        balance: U256,
        required: U256,
    },
    #[error("balance of {token} overflows for {holder}")]
    Overflow { token: Address, holder: Address },
}

/// Balances and allowances of every token (and the native currency) for
/// every holder.
///
/// This plays the role the token contracts and the account state play on a
/// chain. Every movement is checked: a transfer either moves the full
/// amount or fails without touching anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLedger {
    /// (token, holder) -> balance
    #[serde(with = "balances_serde")]
    balances: HashMap<(Address, Address), U256>,
    /// (token, owner, spender) -> allowance
    #[serde(with = "allowances_serde", default)]
    allowances: HashMap<(Address, Address, Address), U256>,
}

mod balances_serde {
    use super::*;
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;

    pub fn serialize<S: serde::Serializer>(
        balances: &HashMap<(Address, Address), U256>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(balances.len()))?;
        for ((token, holder), amount) in balances {
            map.serialize_entry(&format!("{}:{}", token, holder), &amount.to_string())?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<(Address, Address), U256>, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = HashMap<(Address, Address), U256>;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map with \"token:holder\" keys and decimal amounts")
            }
            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut map = HashMap::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    let (token, holder) = key
                        .split_once(':')
                        .ok_or_else(|| de::Error::custom(format!("invalid key: {key}")))?;
                    let token: Address = token.parse().map_err(de::Error::custom)?;
                    let holder: Address = holder.parse().map_err(de::Error::custom)?;
                    let amount =
                        crate::core::token::parse_amount(&value).map_err(de::Error::custom)?;
                    map.insert((token, holder), amount);
                }
                Ok(map)
            }
        }
        deserializer.deserialize_map(V)
    }
}

mod allowances_serde {
    use super::*;
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;

    pub fn serialize<S: serde::Serializer>(
        allowances: &HashMap<(Address, Address, Address), U256>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(allowances.len()))?;
        for ((token, owner, spender), amount) in allowances {
            map.serialize_entry(&format!("{}:{}:{}", token, owner, spender), &amount.to_string())?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<(Address, Address, Address), U256>, D::Error> {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = HashMap<(Address, Address, Address), U256>;
            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map with \"token:owner:spender\" keys and decimal amounts")
            }
            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut map = HashMap::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    let mut parts = key.splitn(3, ':');
                    let mut next = || -> Result<Address, M::Error> {
                        parts
                            .next()
                            .ok_or_else(|| de::Error::custom(format!("invalid key: {key}")))?
                            .parse()
                            .map_err(de::Error::custom)
                    };
                    let (token, owner, spender) = (next()?, next()?, next()?);
                    let amount =
                        crate::core::token::parse_amount(&value).map_err(de::Error::custom)?;
                    map.insert((token, owner, spender), amount);
                }
                Ok(map)
            }
        }
        deserializer.deserialize_map(V)
    }
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, token: &Address, holder: &Address) -> U256 {
        self.balances
            .get(&(*token, *holder))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn native_balance(&self, holder: &Address) -> U256 {
        self.balance_of(&NATIVE, holder)
    }

    pub fn allowance(&self, token: &Address, owner: &Address, spender: &Address) -> U256 {
        self.allowances
            .get(&(*token, *owner, *spender))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Set (not add to) the allowance `owner` grants `spender`.
    pub fn approve(&mut self, token: &Address, owner: &Address, spender: &Address, amount: U256) {
        self.allowances.insert((*token, *owner, *spender), amount);
    }

    /// Create `amount` of `token` out of thin air for `to`.
    pub fn mint(&mut self, token: &Address, to: &Address, amount: U256) -> Result<(), TransferError> {
        let balance = self.balance_of(token, to);
        let updated = balance.checked_add(amount).ok_or(TransferError::Overflow {
            token: *token,
            holder: *to,
        })?;
        self.balances.insert((*token, *to), updated);
        Ok(())
    }

    /// Destroy `amount` of `token` held by `from`.
    pub fn burn(&mut self, token: &Address, from: &Address, amount: U256) -> Result<(), TransferError> {
        let balance = self.balance_of(token, from);
        let remaining = balance
            .checked_sub(amount)
            .ok_or(TransferError::InsufficientBalance {
                token: *token,
                holder: *from,
                balance,
                required: amount,
            })?;
        self.balances.insert((*token, *from), remaining);
        Ok(())
    }

    /// Move `amount` of `token` from `from` to `to`.
    pub fn transfer(
        &mut self,
        token: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> Result<(), TransferError> {
        let from_balance = self.balance_of(token, from);
        if from_balance < amount {
            return Err(TransferError::InsufficientBalance {
                token: *token,
                holder: *from,
                balance: from_balance,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_balance = self.balance_of(token, to);
        let credited = to_balance.checked_add(amount).ok_or(TransferError::Overflow {
            token: *token,
            holder: *to,
        })?;
        self.balances.insert((*token, *from), from_balance - amount);
        self.balances.insert((*token, *to), credited);
        Ok(())
    }

    /// Move `amount` of `token` from `from` to `to` on behalf of `spender`,
    /// consuming `spender`'s allowance.
    pub fn transfer_from(
        &mut self,
        token: &Address,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> Result<(), TransferError> {
        let allowance = self.allowance(token, from, spender);
        if allowance < amount {
            return Err(TransferError::InsufficientAllowance {
                token: *token,
                owner: *from,
                spender: *spender,
                allowance,
                required: amount,
            });
        }
        self.transfer(token, from, to, amount)?;
        if allowance != U256::MAX {
            self.allowances
                .insert((*token, *from, *spender), allowance - amount);
        }
        Ok(())
    }

    /// Sum of all balances of `token` across holders.
    pub fn total_supply(&self, token: &Address) -> U256 {
        self.balances
            .iter()
            .filter(|((t, _), _)| t == token)
            .fold(U256::ZERO, |acc, (_, v)| acc.saturating_add(*v))
    }

    /// All non-zero holdings of `holder`, ordered by token.
    pub fn holdings(&self, holder: &Address) -> BTreeMap<Address, U256> {
        self.balances
            .iter()
            .filter(|((_, h), v)| h == holder && **v > U256::ZERO)
            .map(|((t, _), v)| (*t, *v))
            .collect()
    }

    /// Every token that has ever held a balance.
    pub fn tokens(&self) -> Vec<Address> {
        let mut tokens: Vec<Address> = self.balances.keys().map(|(t, _)| *t).collect();
        tokens.sort();
        tokens.dedup();
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Address {
        Address::repeat_byte(0xaa)
    }

    #[test]
    fn test_mint_and_transfer() {
        let mut ledger = TokenLedger::new();
        let (alice, bob) = (Address::repeat_byte(1), Address::repeat_byte(2));
        ledger.mint(&token(), &alice, U256::from(100u64)).unwrap();
        ledger
            .transfer(&token(), &alice, &bob, U256::from(40u64))
            .unwrap();

        assert_eq!(ledger.balance_of(&token(), &alice), U256::from(60u64));
        assert_eq!(ledger.balance_of(&token(), &bob), U256::from(40u64));
        assert_eq!(ledger.total_supply(&token()), U256::from(100u64));
    }

    #[test]
    fn test_transfer_insufficient_balance_leaves_state() {
        let mut ledger = TokenLedger::new();
        let (alice, bob) = (Address::repeat_byte(1), Address::repeat_byte(2));
        ledger.mint(&token(), &alice, U256::from(10u64)).unwrap();
        let before = ledger.clone();

        let err = ledger
            .transfer(&token(), &alice, &bob, U256::from(11u64))
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientBalance { .. }));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut ledger = TokenLedger::new();
        let (alice, bob, spender) = (
            Address::repeat_byte(1),
            Address::repeat_byte(2),
            Address::repeat_byte(3),
        );
        ledger.mint(&token(), &alice, U256::from(100u64)).unwrap();
        ledger.approve(&token(), &alice, &spender, U256::from(50u64));

        ledger
            .transfer_from(&token(), &spender, &alice, &bob, U256::from(30u64))
            .unwrap();
        assert_eq!(ledger.allowance(&token(), &alice, &spender), U256::from(20u64));

        let err = ledger
            .transfer_from(&token(), &spender, &alice, &bob, U256::from(30u64))
            .unwrap_err();
        assert!(matches!(err, TransferError::InsufficientAllowance { .. }));
    }

    #[test]
    fn test_infinite_allowance_is_not_consumed() {
        let mut ledger = TokenLedger::new();
        let (alice, spender) = (Address::repeat_byte(1), Address::repeat_byte(3));
        ledger.mint(&token(), &alice, U256::from(100u64)).unwrap();
        ledger.approve(&token(), &alice, &spender, U256::MAX);
        ledger
            .transfer_from(&token(), &spender, &alice, &spender, U256::from(100u64))
            .unwrap();
        assert_eq!(ledger.allowance(&token(), &alice, &spender), U256::MAX);
    }

    #[test]
    fn test_burn_reduces_supply() {
        let mut ledger = TokenLedger::new();
        let alice = Address::repeat_byte(1);
        ledger.mint(&token(), &alice, U256::from(100u64)).unwrap();
        ledger.burn(&token(), &alice, U256::from(25u64)).unwrap();
        assert_eq!(ledger.total_supply(&token()), U256::from(75u64));
        assert!(ledger.burn(&token(), &alice, U256::from(76u64)).is_err());
    }

    #[test]
    fn test_balances_serialize_with_string_keys() {
        let mut ledger = TokenLedger::new();
        ledger
            .mint(&token(), &Address::repeat_byte(1), U256::from(7u64))
            .unwrap();
        let json = serde_json::to_string(&ledger).unwrap();
        let back: TokenLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.balance_of(&token(), &Address::repeat_byte(1)),
            U256::from(7u64)
        );
    }

    #[test]
    fn test_allowances_survive_serialization() {
        let mut ledger = TokenLedger::new();
        let (owner, spender) = (Address::repeat_byte(1), Address::repeat_byte(2));
        ledger.approve(&token(), &owner, &spender, U256::from(40u64));
        ledger.approve(&token(), &spender, &owner, U256::MAX);

        let json = serde_json::to_string(&ledger).unwrap();
        let back: TokenLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger);
        assert_eq!(back.allowance(&token(), &owner, &spender), U256::from(40u64));
    }

    #[test]
    fn test_ledger_without_allowances_still_parses() {
        let back: TokenLedger = serde_json::from_str(r#"{"balances":{}}"#).unwrap();
        assert_eq!(back, TokenLedger::new());
    }
}
