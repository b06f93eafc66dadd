use crate::chain::contract::{CallContext, Contract, Revert};
use crate::core::events::Event;
use crate::core::ledger::TokenLedger;
use crate::core::token::NATIVE;
use alloy_primitives::{Address, Bytes, U256};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Registration of a token manager: who administers it and which router
/// may move the funds it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianRecord {
    pub owner: Address,
    pub router: Address,
}

/// Everything a settlement can observe or change: balances, deployed
/// contracts, token manager registrations and the event log.
///
/// Settlements never mutate a `ChainState` in place. They run inside
/// [`ChainState::transact`], which hands them a staged copy and swaps it in
/// only when they succeed.
#[derive(Debug, Clone, Default)]
pub struct ChainState {
    ledger: TokenLedger,
    contracts: HashMap<Address, Box<dyn Contract>>,
    custodians: HashMap<Address, CustodianRecord>,
    events: Vec<Event>,
}

impl ChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut TokenLedger {
        &mut self.ledger
    }

    /// Deploy `contract` at `address`, replacing anything already there.
    pub fn deploy(&mut self, address: Address, contract: Box<dyn Contract>) {
        debug!("deploying contract at {}", address);
        self.contracts.insert(address, contract);
    }

    /// Register a token manager at `address`. Each address can be
    /// registered once, and never where a contract is deployed.
    pub fn register_custodian(&mut self, address: Address, record: CustodianRecord) -> Result<(), Revert> {
        if self.custodians.contains_key(&address) || self.contracts.contains_key(&address) {
            return Err(Revert::new(format!("{} is already deployed", address)));
        }
        debug!("registering token manager at {} for router {}", address, record.router);
        self.custodians.insert(address, record);
        Ok(())
    }

    pub fn custodian(&self, address: &Address) -> Option<&CustodianRecord> {
        self.custodians.get(address)
    }

    pub(crate) fn custodian_mut(&mut self, address: &Address) -> Option<&mut CustodianRecord> {
        self.custodians.get_mut(address)
    }

    /// Whether `address` has executable code.
    pub fn has_code(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    pub fn balance_of(&self, token: &Address, holder: &Address) -> U256 {
        self.ledger.balance_of(token, holder)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn emit(&mut self, event: Event) {
        debug!("event {}", event.name());
        self.events.push(event);
    }

    /// Call `target` from `sender`, attaching `value` native currency.
    ///
    /// Fails if `target` has no code, if `sender` cannot fund `value`, or if
    /// the contract reverts. Partial effects of a failed call are not undone
    /// here; callers run inside [`ChainState::transact`].
    pub fn call(
        &mut self,
        sender: Address,
        target: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, Revert> {
        if !self.has_code(&target) {
            return Err(Revert::new(format!("no code at {}", target)));
        }
        if value > U256::ZERO {
            self.ledger.transfer(&NATIVE, &sender, &target, value)?;
        }
        let Self {
            ledger, contracts, ..
        } = self;
        let contract = contracts
            .get_mut(&target)
            .ok_or_else(|| Revert::new(format!("no code at {}", target)))?;
        let mut ctx = CallContext {
            ledger,
            sender,
            this: target,
            value,
        };
        contract.call(&mut ctx, data)
    }

    /// Run `f` against a staged copy of the chain and commit it only if `f`
    /// succeeds. On error the chain is exactly as it was before.
    pub fn transact<T, E>(
        &mut self,
        f: impl FnOnce(&mut ChainState) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut staged = self.clone();
        let out = f(&mut staged)?;
        *self = staged;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Takes whatever value it is sent and pays out `payout` of `token`.
    #[derive(Debug, Clone)]
    struct Faucet {
        token: Address,
        payout: U256,
    }

    impl Contract for Faucet {
        fn call(&mut self, ctx: &mut CallContext<'_>, data: &[u8]) -> Result<Bytes, Revert> {
            if data == b"fail" {
                return Err(Revert::new("asked to fail"));
            }
            ctx.ledger
                .transfer(&self.token, &ctx.this, &ctx.sender, self.payout)?;
            Ok(Bytes::new())
        }

        fn clone_box(&self) -> Box<dyn Contract> {
            Box::new(self.clone())
        }
    }

    fn setup() -> (ChainState, Address, Address, Address) {
        let mut chain = ChainState::new();
        let token = Address::repeat_byte(0xaa);
        let faucet = Address::repeat_byte(0xf0);
        let user = Address::repeat_byte(0x01);
        chain.deploy(
            faucet,
            Box::new(Faucet {
                token,
                payout: U256::from(10u64),
            }),
        );
        chain
            .ledger_mut()
            .mint(&token, &faucet, U256::from(100u64))
            .unwrap();
        chain
            .ledger_mut()
            .mint(&NATIVE, &user, U256::from(5u64))
            .unwrap();
        (chain, token, faucet, user)
    }

    #[test]
    fn test_call_moves_value_and_runs_code() {
        let (mut chain, token, faucet, user) = setup();
        chain.call(user, faucet, U256::from(2u64), b"").unwrap();
        assert_eq!(chain.balance_of(&token, &user), U256::from(10u64));
        assert_eq!(chain.balance_of(&NATIVE, &faucet), U256::from(2u64));
    }

    #[test]
    fn test_call_without_code_reverts() {
        let (mut chain, _, _, user) = setup();
        let err = chain
            .call(user, Address::repeat_byte(0x99), U256::ZERO, b"")
            .unwrap_err();
        assert!(err.reason.contains("no code"));
    }

    #[test]
    fn test_call_with_unfunded_value_reverts() {
        let (mut chain, _, faucet, user) = setup();
        assert!(chain.call(user, faucet, U256::from(6u64), b"").is_err());
    }

    #[test]
    fn test_transact_rolls_back_on_error() {
        let (mut chain, token, faucet, user) = setup();
        let before = chain.ledger().clone();

        let result: Result<(), Revert> = chain.transact(|staged| {
            staged.call(user, faucet, U256::from(1u64), b"")?;
            staged.emit(Event::TokenReturned {
                token,
                amount: U256::from(1u64),
            });
            staged.call(user, faucet, U256::ZERO, b"fail")?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(chain.ledger(), &before);
        assert!(chain.events().is_empty());
    }

    #[test]
    fn test_custodian_registered_once() {
        let (mut chain, _, faucet, user) = setup();
        let custody = Address::repeat_byte(0x7a);
        let record = CustodianRecord {
            owner: user,
            router: Address::repeat_byte(0x70),
        };
        chain.register_custodian(custody, record).unwrap();
        assert_eq!(chain.custodian(&custody), Some(&record));

        let hijack = CustodianRecord {
            owner: user,
            router: user,
        };
        assert!(chain.register_custodian(custody, hijack).is_err());
        assert!(chain.register_custodian(faucet, hijack).is_err());
        assert_eq!(chain.custodian(&custody), Some(&record));
    }

    #[test]
    fn test_transact_rolls_back_router_rotation() {
        let (mut chain, _, _, user) = setup();
        let custody = Address::repeat_byte(0x7a);
        let router = Address::repeat_byte(0x70);
        chain
            .register_custodian(custody, CustodianRecord { owner: user, router })
            .unwrap();

        let result: Result<(), Revert> = chain.transact(|staged| {
            if let Some(record) = staged.custodian_mut(&custody) {
                record.router = user;
            }
            Err(Revert::new("abort"))
        });
        assert!(result.is_err());
        assert_eq!(chain.custodian(&custody).map(|r| r.router), Some(router));
    }

    #[test]
    fn test_transact_commits_on_success() {
        let (mut chain, token, faucet, user) = setup();
        chain
            .transact(|staged| staged.call(user, faucet, U256::ZERO, b""))
            .unwrap();
        assert_eq!(chain.balance_of(&token, &user), U256::from(10u64));
    }
}
