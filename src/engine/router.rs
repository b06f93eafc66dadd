use crate::chain::state::ChainState;
use crate::core::error::SettlementError;
use crate::core::events::Event;
use crate::core::order::{Order, Relay, RelayTiming};
use crate::core::step::TrustedRoute;
use crate::core::token::{amount_serde, NATIVE};
use crate::engine::balances::{BalanceDelta, BalanceTracker};
use crate::engine::executor::StepExecutor;
use crate::engine::settings::RouterSettings;
use crate::engine::token_manager::TokenManager;
use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Where a settlement is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementPhase {
    Idle,
    PullingInputs,
    ExecutingRoute,
    Relaying,
    VerifyingOutputs,
    Settling,
    Done,
    Aborted,
}

impl fmt::Display for SettlementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What one step of the route did to custody balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub target: Address,
    #[serde(with = "amount_serde")]
    pub value: U256,
    pub deltas: Vec<BalanceDelta>,
}

/// A token forwarded to the recipient at settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnedToken {
    pub token: Address,
    #[serde(with = "amount_serde")]
    pub amount: U256,
}

/// Proof of a completed settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub id: Uuid,
    pub fingerprint: B256,
    pub caller: Address,
    pub recipient: Address,
    pub settled_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    /// Net custody change over the whole route.
    pub route_deltas: Vec<BalanceDelta>,
    pub returned: Vec<ReturnedToken>,
}

impl SettlementReceipt {
    /// Amount of `token` forwarded to the recipient.
    pub fn returned_amount(&self, token: &Address) -> U256 {
        self.returned
            .iter()
            .filter(|r| r.token == *token)
            .fold(U256::ZERO, |acc, r| acc.saturating_add(r.amount))
    }
}

impl fmt::Display for SettlementReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Settlement Receipt ===")?;
        writeln!(f, "Id:          {}", self.id)?;
        writeln!(f, "Fingerprint: {}", self.fingerprint)?;
        writeln!(f, "Caller:      {}", self.caller)?;
        writeln!(f, "Recipient:   {}", self.recipient)?;
        writeln!(f, "Settled at:  {}", self.settled_at.to_rfc3339())?;

        for step in &self.steps {
            writeln!(f, "\n--- Step {} → {} (value {}) ---", step.index, step.target, step.value)?;
            for delta in &step.deltas {
                writeln!(f, "  {}: {} → {}", delta.token, delta.before, delta.after)?;
            }
        }

        writeln!(f, "\nReturned:")?;
        for returned in &self.returned {
            writeln!(f, "  {} {}", returned.amount, returned.token)?;
        }
        Ok(())
    }
}

/// Drives orders through custody, the route and settlement.
///
/// # Lifecycle
///
/// 1. Pull inputs: attached native value and allowance-based token pulls
///    move into custody.
/// 2. Execute the route, one step at a time, in order.
/// 3. Optionally perform the relay call (before the route or after
///    settlement, as the order asks).
/// 4. Verify every declared output against its minimum.
/// 5. Forward every declared output's full custody balance to the
///    recipient.
///
/// The whole lifecycle runs against a staged copy of the chain; any error
/// discards it. Tokens that end up in custody without being declared as
/// outputs stay there.
///
/// Which router may move custody funds is recorded on the chain, not in the
/// router value. Copies of a router that has been migrated away from are
/// refused by the token manager.
#[derive(Debug, Clone)]
pub struct OrderRouter {
    address: Address,
    settings: RouterSettings,
    token_manager: TokenManager,
}

impl OrderRouter {
    pub fn new(address: Address, settings: RouterSettings, token_manager: TokenManager) -> Self {
        Self {
            address,
            settings,
            token_manager,
        }
    }

    /// A router owned by `owner`, together with a new token manager at
    /// `token_manager_address` registered to it.
    ///
    /// Fails if a token manager already exists at that address.
    pub fn deploy(
        chain: &mut ChainState,
        address: Address,
        owner: Address,
        token_manager_address: Address,
    ) -> Result<Self, SettlementError> {
        let token_manager = TokenManager::deploy(chain, token_manager_address, owner, address)?;
        Ok(Self::new(address, RouterSettings::new(owner), token_manager))
    }

    /// Whether the token manager currently accepts this router.
    pub fn is_registered(&self, chain: &ChainState) -> bool {
        self.token_manager.router(chain) == Some(self.address)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.token_manager
    }

    /// The custody account users approve and the route runs from.
    pub fn custody(&self) -> Address {
        self.token_manager.address()
    }

    pub fn pause(&mut self, caller: &Address) -> Result<(), SettlementError> {
        self.settings.pause(caller)
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<(), SettlementError> {
        self.settings.unpause(caller)
    }

    pub fn set_operator(
        &mut self,
        caller: &Address,
        operator: Address,
        enabled: bool,
    ) -> Result<(), SettlementError> {
        self.settings.set_operator(caller, operator, enabled)
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<(), SettlementError> {
        self.settings.transfer_ownership(caller, new_owner)
    }

    /// Settle `order` along `route`, with `value` native currency attached
    /// by `caller`.
    ///
    /// On error `chain` is left exactly as it was.
    pub fn execute_order(
        &self,
        chain: &mut ChainState,
        caller: Address,
        value: U256,
        order: &Order,
        route: &TrustedRoute,
    ) -> Result<SettlementReceipt, SettlementError> {
        if self.settings.is_paused() && !self.settings.is_operator(&caller) {
            return Err(SettlementError::Paused);
        }
        if caller != order.user {
            return Err(SettlementError::InvalidCaller {
                user: order.user,
                caller,
            });
        }
        if order.inputs.is_empty() {
            return Err(SettlementError::EmptyInputs);
        }

        let fingerprint = order.fingerprint();
        debug!(
            "settling order {} with {} steps for {}",
            fingerprint,
            route.len(),
            caller
        );

        let mut phase = SettlementPhase::Idle;
        let result = chain.transact(|staged| {
            self.settle(staged, caller, value, order, route, fingerprint, &mut phase)
        });
        match &result {
            Ok(receipt) => info!(
                "order {} settled to {} ({} tokens returned)",
                fingerprint,
                receipt.recipient,
                receipt.returned.len()
            ),
            Err(err) => {
                let failed_in = abort(&mut phase);
                warn!("order {} aborted during {}: {}", fingerprint, failed_in, err);
            }
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn settle(
        &self,
        chain: &mut ChainState,
        caller: Address,
        value: U256,
        order: &Order,
        route: &TrustedRoute,
        fingerprint: B256,
        phase: &mut SettlementPhase,
    ) -> Result<SettlementReceipt, SettlementError> {
        let executor = StepExecutor::new(self.address, self.token_manager);

        advance(phase, SettlementPhase::PullingInputs);
        self.pull_inputs(chain, caller, value, order)?;

        if order.relay.is_enabled() && order.relay.timing == RelayTiming::BeforeRoute {
            advance(phase, SettlementPhase::Relaying);
            self.relay(chain, &executor, &order.relay)?;
        }

        advance(phase, SettlementPhase::ExecutingRoute);
        let mut tracker = BalanceTracker::new(self.custody(), self.tracked_tokens(order, route));
        tracker.open(chain.ledger());
        let mut steps = Vec::with_capacity(route.len());
        for (index, step) in route.steps().iter().enumerate() {
            let before = tracker.snapshot(chain.ledger());
            executor.execute(chain, step)?;
            let deltas = tracker.step_deltas(&before, chain.ledger());
            debug!("step {} on {} moved {} balances", index, step.target, deltas.len());
            steps.push(StepReport {
                index,
                target: step.target,
                value: step.value,
                deltas,
            });
        }

        let route_deltas = tracker.route_deltas(chain.ledger());

        advance(phase, SettlementPhase::VerifyingOutputs);
        for output in &order.outputs {
            let balance = self.token_manager.custody_balance(chain.ledger(), &output.token);
            if balance < output.min_output_amount {
                return Err(SettlementError::Slippage {
                    token: output.token,
                    min_output_amount: output.min_output_amount,
                    balance,
                });
            }
        }

        advance(phase, SettlementPhase::Settling);
        let mut returned = Vec::new();
        for output in &order.outputs {
            let balance = self.token_manager.custody_balance(chain.ledger(), &output.token);
            if balance == U256::ZERO {
                continue;
            }
            self.token_manager.forward(
                chain,
                &self.address,
                &output.token,
                &order.recipient,
                balance,
            )?;
            chain.emit(Event::TokenReturned {
                token: output.token,
                amount: balance,
            });
            returned.push(ReturnedToken {
                token: output.token,
                amount: balance,
            });
        }

        if order.relay.is_enabled() && order.relay.timing == RelayTiming::AfterSettlement {
            advance(phase, SettlementPhase::Relaying);
            self.relay(chain, &executor, &order.relay)?;
        }

        chain.emit(Event::FulfilledOrder {
            fingerprint,
            caller,
            recipient: order.recipient,
        });
        advance(phase, SettlementPhase::Done);

        Ok(SettlementReceipt {
            id: Uuid::new_v4(),
            fingerprint,
            caller,
            recipient: order.recipient,
            settled_at: Utc::now(),
            steps,
            route_deltas,
            returned,
        })
    }

    fn pull_inputs(
        &self,
        chain: &mut ChainState,
        caller: Address,
        value: U256,
        order: &Order,
    ) -> Result<(), SettlementError> {
        let required = order.native_input_total().ok_or(SettlementError::InsufficientNativeValue {
            attached: value,
            required: U256::MAX,
        })?;
        if value < required {
            return Err(SettlementError::InsufficientNativeValue {
                attached: value,
                required,
            });
        }
        if value > U256::ZERO {
            let custody = self.custody();
            chain
                .ledger_mut()
                .transfer(&NATIVE, &caller, &custody, value)
                .map_err(|e| SettlementError::TransferFailed {
                    token: NATIVE,
                    from: caller,
                    to: custody,
                    amount: value,
                    reason: e.to_string(),
                })?;
        }
        self.token_manager
            .pull_inputs(chain, &self.address, &order.user, &order.inputs)
    }

    fn relay(
        &self,
        chain: &mut ChainState,
        executor: &StepExecutor,
        relay: &Relay,
    ) -> Result<(), SettlementError> {
        executor.check_target(chain, &relay.target)?;
        let balance = self.token_manager.custody_balance(chain.ledger(), &NATIVE);
        if balance < relay.value {
            return Err(SettlementError::InsufficientRelayValue {
                balance,
                relay_value: relay.value,
            });
        }
        self.token_manager
            .dispatch(chain, &self.address, relay.target, relay.value, &relay.data)?;
        chain.emit(Event::RelayData {
            target: relay.target,
            value: relay.value,
            data: relay.data.clone(),
        });
        Ok(())
    }

    /// Every token whose custody balance is worth watching during a route.
    fn tracked_tokens(&self, order: &Order, route: &TrustedRoute) -> Vec<Address> {
        let mut tokens: Vec<Address> = std::iter::once(NATIVE)
            .chain(order.inputs.iter().map(|i| i.token))
            .chain(order.outputs.iter().map(|o| o.token))
            .chain(route.tokens())
            .collect();
        tokens.sort();
        tokens.dedup();
        tokens
    }

    /// Send the entire custody balance of `token` to `to`.
    ///
    /// Recovers tokens stranded by orders that did not declare them as
    /// outputs. Operators only; allowed while paused.
    pub fn rescue(
        &self,
        chain: &mut ChainState,
        caller: &Address,
        token: &Address,
        to: &Address,
    ) -> Result<U256, SettlementError> {
        self.settings.require_operator(caller)?;
        let amount = self.token_manager.custody_balance(chain.ledger(), token);
        if amount > U256::ZERO {
            self.token_manager
                .forward(chain, &self.address, token, to, amount)?;
        }
        info!("{} rescued {} of {} to {}", caller, amount, token, to);
        Ok(amount)
    }

    /// Hand the token manager over to a router at `new_address`.
    ///
    /// The registration changes on `chain`, so after this no copy of the
    /// old router can move custody funds.
    pub fn migrate(
        self,
        chain: &mut ChainState,
        caller: &Address,
        new_address: Address,
    ) -> Result<OrderRouter, SettlementError> {
        self.settings.require_owner(caller)?;
        self.token_manager.set_router(chain, caller, new_address)?;
        info!("router migrated from {} to {}", self.address, new_address);
        Ok(OrderRouter::new(new_address, self.settings, self.token_manager))
    }
}

fn advance(phase: &mut SettlementPhase, next: SettlementPhase) {
    debug!("settlement phase {} -> {}", phase, next);
    *phase = next;
}

/// Move to `Aborted`, returning the phase the settlement failed in.
fn abort(phase: &mut SettlementPhase) -> SettlementPhase {
    let failed_in = *phase;
    advance(phase, SettlementPhase::Aborted);
    failed_in
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::contract::{CallContext, Contract, Revert};
    use crate::core::order::{Input, Output};
    use crate::core::step::{Step, StepToken};
    use alloy_primitives::Bytes;

    /// Pays `payout` of `token_out` for anything of `token_in` it is allowed
    /// to take.
    #[derive(Debug, Clone)]
    struct FixedRateDesk {
        token_in: Address,
        token_out: Address,
        payout: U256,
    }

    impl Contract for FixedRateDesk {
        fn call(&mut self, ctx: &mut CallContext<'_>, _data: &[u8]) -> Result<Bytes, Revert> {
            let allowed = ctx.ledger.allowance(&self.token_in, &ctx.sender, &ctx.this);
            if allowed == U256::ZERO {
                return Err(Revert::new("nothing to swap"));
            }
            ctx.ledger
                .transfer_from(&self.token_in, &ctx.this, &ctx.sender, &ctx.this, allowed)?;
            ctx.ledger
                .transfer(&self.token_out, &ctx.this, &ctx.sender, self.payout)?;
            Ok(Bytes::new())
        }

        fn clone_box(&self) -> Box<dyn Contract> {
            Box::new(self.clone())
        }
    }

    struct Fixture {
        chain: ChainState,
        router: OrderRouter,
        owner: Address,
        user: Address,
        desk: Address,
        token_a: Address,
        token_b: Address,
    }

    fn fixture(payout: u64) -> Fixture {
        let owner = Address::repeat_byte(0x0e);
        let user = Address::repeat_byte(0x01);
        let desk = Address::repeat_byte(0xd0);
        let token_a = Address::repeat_byte(0xaa);
        let token_b = Address::repeat_byte(0xbb);

        let mut chain = ChainState::new();
        let router = OrderRouter::deploy(&mut chain, Address::repeat_byte(0x70), owner, Address::repeat_byte(0x7a))
            .unwrap();
        chain.deploy(
            desk,
            Box::new(FixedRateDesk {
                token_in: token_a,
                token_out: token_b,
                payout: U256::from(payout),
            }),
        );
        let ledger = chain.ledger_mut();
        ledger.mint(&token_a, &user, U256::from(1_000u64)).unwrap();
        ledger.mint(&token_b, &desk, U256::from(1_000_000u64)).unwrap();
        ledger.approve(&token_a, &user, &router.custody(), U256::MAX);

        Fixture {
            chain,
            router,
            owner,
            user,
            desk,
            token_a,
            token_b,
        }
    }

    fn swap_order(f: &Fixture, min_out: u64) -> (Order, TrustedRoute) {
        let order = Order::new(f.user)
            .with_input(Input::new(f.token_a, U256::from(1_000u64)))
            .with_output(Output::new(f.token_b, U256::from(min_out)))
            .with_output(Output::refund(f.token_a));
        let route = TrustedRoute::from_quote(vec![
            Step::new(f.desk, Bytes::new()).with_token(StepToken::new(f.token_a))
        ]);
        (order, route)
    }

    #[test]
    fn test_settles_and_emits_events() {
        let mut f = fixture(950);
        let (order, route) = swap_order(&f, 900);
        let receipt = f
            .router
            .execute_order(&mut f.chain, f.user, U256::ZERO, &order, &route)
            .unwrap();

        assert_eq!(receipt.returned_amount(&f.token_b), U256::from(950u64));
        assert_eq!(f.chain.balance_of(&f.token_b, &f.user), U256::from(950u64));
        assert_eq!(f.chain.balance_of(&f.token_a, &f.router.custody()), U256::ZERO);
        assert_eq!(receipt.steps.len(), 1);
        assert_eq!(receipt.fingerprint, order.fingerprint());
        let spent: Vec<_> = receipt
            .route_deltas
            .iter()
            .map(|d| (d.token, d.spent(), d.gained()))
            .collect();
        assert!(spent.contains(&(f.token_a, U256::from(1_000u64), U256::ZERO)));
        assert!(spent.contains(&(f.token_b, U256::ZERO, U256::from(950u64))));

        let names: Vec<&str> = f.chain.events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["TokenReturned", "FulfilledOrder"]);
    }

    #[test]
    fn test_slippage_rolls_everything_back() {
        let mut f = fixture(850);
        let (order, route) = swap_order(&f, 900);
        let before = f.chain.ledger().clone();

        let err = f
            .router
            .execute_order(&mut f.chain, f.user, U256::ZERO, &order, &route)
            .unwrap_err();
        assert_eq!(
            err,
            SettlementError::Slippage {
                token: f.token_b,
                min_output_amount: U256::from(900u64),
                balance: U256::from(850u64),
            }
        );
        assert_eq!(f.chain.ledger(), &before);
        assert!(f.chain.events().is_empty());
    }

    #[test]
    fn test_paused_router_refuses_users_but_not_operators() {
        let mut f = fixture(950);
        let (order, route) = swap_order(&f, 900);
        f.router.pause(&f.owner).unwrap();

        let err = f
            .router
            .execute_order(&mut f.chain, f.user, U256::ZERO, &order, &route)
            .unwrap_err();
        assert_eq!(err, SettlementError::Paused);

        let owner = f.owner;
        f.router.set_operator(&owner, f.user, true).unwrap();
        f.router
            .execute_order(&mut f.chain, f.user, U256::ZERO, &order, &route)
            .unwrap();
    }

    #[test]
    fn test_caller_must_be_order_user() {
        let mut f = fixture(950);
        let (order, route) = swap_order(&f, 900);
        let stranger = Address::repeat_byte(0x66);
        let err = f
            .router
            .execute_order(&mut f.chain, stranger, U256::ZERO, &order, &route)
            .unwrap_err();
        assert_eq!(
            err,
            SettlementError::InvalidCaller {
                user: f.user,
                caller: stranger
            }
        );
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let mut f = fixture(950);
        let order = Order::new(f.user);
        let err = f
            .router
            .execute_order(&mut f.chain, f.user, U256::ZERO, &order, &TrustedRoute::default())
            .unwrap_err();
        assert_eq!(err, SettlementError::EmptyInputs);
    }

    #[test]
    fn test_native_input_needs_attached_value() {
        let mut f = fixture(950);
        f.chain
            .ledger_mut()
            .mint(&NATIVE, &f.user, U256::from(100u64))
            .unwrap();
        let order = Order::new(f.user)
            .with_input(Input::new(NATIVE, U256::from(50u64)))
            .with_output(Output::refund(NATIVE));

        let err = f
            .router
            .execute_order(&mut f.chain, f.user, U256::from(49u64), &order, &TrustedRoute::default())
            .unwrap_err();
        assert!(matches!(err, SettlementError::InsufficientNativeValue { .. }));

        let receipt = f
            .router
            .execute_order(&mut f.chain, f.user, U256::from(50u64), &order, &TrustedRoute::default())
            .unwrap();
        assert_eq!(receipt.returned_amount(&NATIVE), U256::from(50u64));
        assert_eq!(f.chain.balance_of(&NATIVE, &f.user), U256::from(100u64));
    }

    #[test]
    fn test_undeclared_tokens_stay_in_custody_until_rescued() {
        let mut f = fixture(950);
        let order = Order::new(f.user)
            .with_input(Input::new(f.token_a, U256::from(1_000u64)))
            .with_output(Output::new(f.token_b, U256::ZERO));
        f.router
            .execute_order(&mut f.chain, f.user, U256::ZERO, &order, &TrustedRoute::default())
            .unwrap();
        let custody = f.router.custody();
        assert_eq!(f.chain.balance_of(&f.token_a, &custody), U256::from(1_000u64));

        let stranger = Address::repeat_byte(0x66);
        assert!(f
            .router
            .rescue(&mut f.chain, &stranger, &f.token_a, &stranger)
            .is_err());

        let owner = f.owner;
        let rescued = f
            .router
            .rescue(&mut f.chain, &owner, &f.token_a, &f.user)
            .unwrap();
        assert_eq!(rescued, U256::from(1_000u64));
        assert_eq!(f.chain.balance_of(&f.token_a, &f.user), U256::from(1_000u64));
    }

    #[test]
    fn test_abort_reports_failed_phase() {
        let mut phase = SettlementPhase::VerifyingOutputs;
        assert_eq!(abort(&mut phase), SettlementPhase::VerifyingOutputs);
        assert_eq!(phase, SettlementPhase::Aborted);
        assert_eq!(phase.to_string(), "Aborted");
    }

    #[test]
    fn test_migrate_hands_over_custody() {
        let mut f = fixture(950);
        let (order, route) = swap_order(&f, 900);
        let next = Address::repeat_byte(0x71);
        let stranger = Address::repeat_byte(0x66);

        let router = f.router.clone();
        assert!(router.migrate(&mut f.chain, &stranger, next).is_err());

        let stale = f.router.clone();
        let migrated = f.router.migrate(&mut f.chain, &f.owner, next).unwrap();
        assert_eq!(migrated.address(), next);
        assert!(migrated.is_registered(&f.chain));
        assert!(!stale.is_registered(&f.chain));

        let before = f.chain.ledger().clone();
        let err = stale
            .execute_order(&mut f.chain, f.user, U256::ZERO, &order, &route)
            .unwrap_err();
        assert_eq!(err, SettlementError::CallerNotRouter { caller: stale.address() });
        assert_eq!(f.chain.ledger(), &before);

        migrated
            .execute_order(&mut f.chain, f.user, U256::ZERO, &order, &route)
            .unwrap();
        assert_eq!(f.chain.balance_of(&f.token_b, &f.user), U256::from(950u64));
    }

    #[test]
    fn test_impostor_router_cannot_touch_custody() {
        let mut f = fixture(950);
        let custody = f.router.custody();
        f.chain
            .ledger_mut()
            .mint(&f.token_a, &custody, U256::from(500u64))
            .unwrap();
        let thief = Address::repeat_byte(0x66);

        let err = OrderRouter::deploy(&mut f.chain, thief, thief, custody).unwrap_err();
        assert_eq!(err, SettlementError::AlreadyDeployed { address: custody });

        let impostor = OrderRouter::new(thief, RouterSettings::new(thief), TokenManager::at(custody));
        let err = impostor
            .rescue(&mut f.chain, &thief, &f.token_a, &thief)
            .unwrap_err();
        assert_eq!(err, SettlementError::CallerNotRouter { caller: thief });
        assert_eq!(f.chain.balance_of(&f.token_a, &custody), U256::from(500u64));
    }
}
