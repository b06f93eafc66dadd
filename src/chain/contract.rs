use crate::core::ledger::{TokenLedger, TransferError};
use alloy_primitives::{Address, Bytes, U256};
use std::fmt;
use thiserror::Error;

/// A failed contract call, carrying the reason the callee gave.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("execution reverted: {reason}")]
pub struct Revert {
    pub reason: String,
}

impl Revert {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<TransferError> for Revert {
    fn from(err: TransferError) -> Self {
        Revert::new(err.to_string())
    }
}

/// What a contract sees while it handles a call.
///
/// The attached `value` has already been credited to `this` when the
/// contract runs.
pub struct CallContext<'a> {
    pub ledger: &'a mut TokenLedger,
    /// The account that made the call.
    pub sender: Address,
    /// The address the called contract is deployed at.
    pub this: Address,
    /// Native currency sent along with the call.
    pub value: U256,
}

/// Executable code deployed at an address.
///
/// Implementations decode `data` however they like; the engine never looks
/// inside. Returning `Err` fails the call and, through the settlement's
/// staging boundary, everything that happened in the same settlement.
pub trait Contract: fmt::Debug + Send {
    fn call(&mut self, ctx: &mut CallContext<'_>, data: &[u8]) -> Result<Bytes, Revert>;

    /// Copy of the contract's state, used when the chain is staged.
    fn clone_box(&self) -> Box<dyn Contract>;
}

impl Clone for Box<dyn Contract> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
