//! Self-contained settlement scenarios.
//!
//! A scenario describes a whole world: balances, allowances, deployed
//! pools and vaults, the router's owner, and one order with its route. The
//! CLI reads scenarios from JSON and runs them.

use crate::chain::state::ChainState;
use crate::collaborators::amm::ConstantProductPool;
use crate::collaborators::vault::SimpleVault;
use crate::core::error::SettlementError;
use crate::core::ledger::TransferError;
use crate::core::order::Order;
use crate::core::step::TrustedRoute;
use crate::core::token::amount_serde;
use crate::engine::router::{OrderRouter, SettlementReceipt};
use alloy_primitives::{Address, U256};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("invalid scenario JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot seed balance: {0}")]
    Seed(#[from] TransferError),

    #[error("settlement failed: {0}")]
    Settlement(#[from] SettlementError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub token: Address,
    pub holder: Address,
    #[serde(with = "amount_serde")]
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceEntry {
    pub token: Address,
    pub owner: Address,
    pub spender: Address,
    #[serde(with = "amount_serde")]
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u64,
}

fn default_fee_bps() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub address: Address,
    pub want: Address,
}

/// Where the engine itself is deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEntry {
    pub router: Address,
    pub token_manager: Address,
    pub owner: Address,
}

impl Default for EngineEntry {
    fn default() -> Self {
        Self {
            router: Address::repeat_byte(0x70),
            token_manager: Address::repeat_byte(0x7a),
            owner: Address::repeat_byte(0x0e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub engine: EngineEntry,
    #[serde(default)]
    pub balances: Vec<BalanceEntry>,
    #[serde(default)]
    pub allowances: Vec<AllowanceEntry>,
    #[serde(default)]
    pub pools: Vec<PoolEntry>,
    #[serde(default)]
    pub vaults: Vec<VaultEntry>,
    pub caller: Address,
    #[serde(with = "amount_serde", default)]
    pub value: U256,
    pub order: Order,
    #[serde(default)]
    pub route: TrustedRoute,
}

/// A settled scenario: the receipt and the world afterwards.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub receipt: SettlementReceipt,
    pub chain: ChainState,
    pub router: OrderRouter,
}

impl ScenarioOutcome {
    /// Final holdings of the order's recipient.
    pub fn recipient_holdings(&self) -> BTreeMap<Address, U256> {
        self.chain.ledger().holdings(&self.receipt.recipient)
    }
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ScenarioError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set up the chain and the router the scenario describes.
    pub fn build(&self) -> Result<(ChainState, OrderRouter), ScenarioError> {
        let mut chain = ChainState::new();
        for entry in &self.balances {
            chain
                .ledger_mut()
                .mint(&entry.token, &entry.holder, entry.amount)?;
        }
        for entry in &self.allowances {
            chain
                .ledger_mut()
                .approve(&entry.token, &entry.owner, &entry.spender, entry.amount);
        }
        for pool in &self.pools {
            chain.deploy(
                pool.address,
                Box::new(ConstantProductPool::new(
                    pool.address,
                    pool.token0,
                    pool.token1,
                    pool.fee_bps,
                )),
            );
        }
        for vault in &self.vaults {
            chain.deploy(vault.address, Box::new(SimpleVault::new(vault.address, vault.want)));
        }

        let router = OrderRouter::deploy(
            &mut chain,
            self.engine.router,
            self.engine.owner,
            self.engine.token_manager,
        )?;
        Ok((chain, router))
    }

    /// Build the world and settle the order in it.
    pub fn run(&self) -> Result<ScenarioOutcome, ScenarioError> {
        let (mut chain, router) = self.build()?;
        info!(
            "running scenario '{}' ({} steps)",
            self.name,
            self.route.len()
        );
        let receipt = router.execute_order(&mut chain, self.caller, self.value, &self.order, &self.route)?;
        Ok(ScenarioOutcome {
            receipt,
            chain,
            router,
        })
    }
}
