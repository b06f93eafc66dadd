use crate::core::error::SettlementError;
use alloy_primitives::Address;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Mutable availability settings of a router.
///
/// The router is handed one of these at construction and never reaches for
/// global state. Only the owner changes who the operators are; owner and
/// operators may pause and unpause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterSettings {
    owner: Address,
    #[serde(default)]
    operators: BTreeSet<Address>,
    #[serde(default)]
    paused: bool,
}

impl RouterSettings {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            operators: BTreeSet::new(),
            paused: false,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Operators can settle and recover funds while the router is paused.
    pub fn is_operator(&self, account: &Address) -> bool {
        *account == self.owner || self.operators.contains(account)
    }

    pub fn operators(&self) -> &BTreeSet<Address> {
        &self.operators
    }

    pub fn require_owner(&self, caller: &Address) -> Result<(), SettlementError> {
        if *caller != self.owner {
            return Err(SettlementError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    pub fn require_operator(&self, caller: &Address) -> Result<(), SettlementError> {
        if !self.is_operator(caller) {
            return Err(SettlementError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    pub fn pause(&mut self, caller: &Address) -> Result<(), SettlementError> {
        self.require_operator(caller)?;
        self.paused = true;
        info!("router paused by {}", caller);
        Ok(())
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<(), SettlementError> {
        self.require_operator(caller)?;
        self.paused = false;
        info!("router unpaused by {}", caller);
        Ok(())
    }

    pub fn set_operator(
        &mut self,
        caller: &Address,
        operator: Address,
        enabled: bool,
    ) -> Result<(), SettlementError> {
        self.require_owner(caller)?;
        if enabled {
            self.operators.insert(operator);
        } else {
            self.operators.remove(&operator);
        }
        info!("operator {} enabled={}", operator, enabled);
        Ok(())
    }

    pub fn transfer_ownership(
        &mut self,
        caller: &Address,
        new_owner: Address,
    ) -> Result<(), SettlementError> {
        self.require_owner(caller)?;
        info!("ownership transferred from {} to {}", self.owner, new_owner);
        self.owner = new_owner;
        Ok(())
    }
}
