use crate::core::token::amount_serde;
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Records emitted by a successful settlement.
///
/// Events are appended to the chain's log inside the settlement's staging
/// state, so an aborted settlement leaves no events behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    /// An output token was forwarded to the recipient.
    TokenReturned {
        token: Address,
        #[serde(with = "amount_serde")]
        amount: U256,
    },
    /// The order's relay call was performed.
    RelayData {
        target: Address,
        #[serde(with = "amount_serde")]
        value: U256,
        data: Bytes,
    },
    /// The whole order settled.
    FulfilledOrder {
        fingerprint: B256,
        caller: Address,
        recipient: Address,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::TokenReturned { .. } => "TokenReturned",
            Event::RelayData { .. } => "RelayData",
            Event::FulfilledOrder { .. } => "FulfilledOrder",
        }
    }
}
