use crate::core::ledger::TokenLedger;
use crate::core::token::amount_serde;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Custody balances of a set of tokens at one point of a settlement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodySnapshot {
    balances: BTreeMap<Address, U256>,
}

impl CustodySnapshot {
    /// Read `custody`'s balance of every token in `tokens`.
    pub fn capture<'a>(
        ledger: &TokenLedger,
        custody: &Address,
        tokens: impl IntoIterator<Item = &'a Address>,
    ) -> Self {
        let balances = tokens
            .into_iter()
            .map(|t| (*t, ledger.balance_of(t, custody)))
            .collect();
        Self { balances }
    }

    /// Balance recorded for `token`; zero for tokens not tracked.
    pub fn balance(&self, token: &Address) -> U256 {
        self.balances.get(token).copied().unwrap_or(U256::ZERO)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Address> {
        self.balances.keys()
    }

    /// Per-token change from `self` to `later`, skipping unchanged tokens.
    pub fn diff(&self, later: &CustodySnapshot) -> Vec<BalanceDelta> {
        let mut tokens: Vec<&Address> = self.balances.keys().chain(later.balances.keys()).collect();
        tokens.sort();
        tokens.dedup();
        tokens
            .into_iter()
            .filter_map(|token| {
                let before = self.balance(token);
                let after = later.balance(token);
                (before != after).then_some(BalanceDelta {
                    token: *token,
                    before,
                    after,
                })
            })
            .collect()
    }
}

/// How one custody balance moved across a step or a whole route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub token: Address,
    #[serde(with = "amount_serde")]
    pub before: U256,
    #[serde(with = "amount_serde")]
    pub after: U256,
}

impl BalanceDelta {
    pub fn gained(&self) -> U256 {
        self.after.saturating_sub(self.before)
    }

    pub fn spent(&self) -> U256 {
        self.before.saturating_sub(self.after)
    }
}

/// Custody snapshots for one settlement: the opening balances of the route
/// and the tokens worth watching.
#[derive(Debug, Clone, Default)]
pub struct BalanceTracker {
    custody: Address,
    tokens: Vec<Address>,
    opening: Option<CustodySnapshot>,
}

impl BalanceTracker {
    pub fn new(custody: Address, tokens: Vec<Address>) -> Self {
        Self {
            custody,
            tokens,
            opening: None,
        }
    }

    pub fn snapshot(&self, ledger: &TokenLedger) -> CustodySnapshot {
        CustodySnapshot::capture(ledger, &self.custody, &self.tokens)
    }

    /// Remember the balances the route starts from.
    pub fn open(&mut self, ledger: &TokenLedger) {
        self.opening = Some(self.snapshot(ledger));
    }

    /// What one step changed since `before`.
    pub fn step_deltas(&self, before: &CustodySnapshot, ledger: &TokenLedger) -> Vec<BalanceDelta> {
        before.diff(&self.snapshot(ledger))
    }

    /// Net change over the whole route.
    pub fn route_deltas(&self, ledger: &TokenLedger) -> Vec<BalanceDelta> {
        match &self.opening {
            Some(opening) => opening.diff(&self.snapshot(ledger)),
            None => Vec::new(),
        }
    }
}
