use crate::chain::state::ChainState;
use crate::core::error::SettlementError;
use crate::core::step::Step;
use crate::core::token::is_native;
use crate::engine::patcher::{AmountInjection, PatchError};
use crate::engine::token_manager::TokenManager;
use alloy_primitives::{Address, Bytes, U256};
use log::debug;

/// Runs single steps of a route on behalf of a router.
///
/// For each step the executor makes the listed tokens available to the
/// target, injects live balances into the payload where asked to, and makes
/// the call from the custody account. It does not retry and does not
/// interpret what the target does.
#[derive(Debug, Clone, Copy)]
pub struct StepExecutor {
    router: Address,
    token_manager: TokenManager,
}

impl StepExecutor {
    pub fn new(router: Address, token_manager: TokenManager) -> Self {
        Self {
            router,
            token_manager,
        }
    }

    /// Refuse targets without code and the engine's own components.
    pub fn check_target(&self, chain: &ChainState, target: &Address) -> Result<(), SettlementError> {
        let own = *target == self.router || *target == self.token_manager.address();
        if own || !chain.has_code(target) {
            return Err(SettlementError::TargetingInvalidContract { target: *target });
        }
        Ok(())
    }

    /// Approve step tokens to the target and build the final call value and
    /// payload.
    ///
    /// A non-native step token is approved for the full custody balance. A
    /// native step token replaces the call value with the full native custody
    /// balance. Tokens with a patch index have that same balance written into
    /// the payload.
    pub fn prepare(&self, chain: &mut ChainState, step: &Step) -> Result<(U256, Vec<u8>), SettlementError> {
        let mut value = step.value;
        let mut payload = step.data.to_vec();

        for step_token in &step.tokens {
            let balance = self
                .token_manager
                .custody_balance(chain.ledger(), &step_token.token);
            if is_native(&step_token.token) {
                value = balance;
            } else {
                self.token_manager.approve(
                    chain,
                    &self.router,
                    &step_token.token,
                    &step.target,
                    balance,
                )?;
            }

            let injection = AmountInjection::from_index(step_token.index, payload.len())
                .map_err(patch_error)?;
            if let Some(injection) = injection {
                injection.apply(&mut payload, balance).map_err(patch_error)?;
                debug!(
                    "injected {} of {} at offset {}",
                    balance,
                    step_token.token,
                    injection.offset()
                );
            }
        }
        Ok((value, payload))
    }

    /// Execute `step`. Any failure aborts the whole settlement.
    pub fn execute(&self, chain: &mut ChainState, step: &Step) -> Result<Bytes, SettlementError> {
        self.check_target(chain, &step.target)?;
        let (value, payload) = self.prepare(chain, step)?;
        debug!(
            "calling {} with value {} and {} bytes",
            step.target,
            value,
            payload.len()
        );
        self.token_manager
            .dispatch(chain, &self.router, step.target, value, &payload)
    }
}

fn patch_error(err: PatchError) -> SettlementError {
    match err {
        PatchError::OutOfBounds {
            offset,
            payload_len,
        } => SettlementError::PatchOutOfBounds {
            offset,
            payload_len,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::contract::{CallContext, Contract, Revert};
    use crate::core::step::StepToken;
    use crate::core::token::NATIVE;

    /// Echoes the payload it receives back as return data, followed by the
    /// call value as one 32-byte word.
    #[derive(Debug, Clone, Default)]
    struct Recorder;

    impl Contract for Recorder {
        fn call(&mut self, ctx: &mut CallContext<'_>, data: &[u8]) -> Result<Bytes, Revert> {
            if data.first() == Some(&0xff) {
                return Err(Revert::new("nope"));
            }
            let mut out = data.to_vec();
            out.extend_from_slice(&ctx.value.to_be_bytes::<32>());
            Ok(Bytes::from(out))
        }

        fn clone_box(&self) -> Box<dyn Contract> {
            Box::new(self.clone())
        }
    }

    struct Fixture {
        chain: ChainState,
        manager: TokenManager,
        router: Address,
        target: Address,
        token: Address,
    }

    fn fixture() -> Fixture {
        let router = Address::repeat_byte(0x70);
        let target = Address::repeat_byte(0x33);
        let token = Address::repeat_byte(0xaa);
        let mut chain = ChainState::new();
        let manager = TokenManager::deploy(&mut chain, Address::repeat_byte(0x7a), router, router).unwrap();
        chain.deploy(target, Box::new(Recorder));
        chain
            .ledger_mut()
            .mint(&token, &manager.address(), U256::from(777u64))
            .unwrap();
        chain
            .ledger_mut()
            .mint(&NATIVE, &manager.address(), U256::from(9u64))
            .unwrap();
        Fixture {
            chain,
            manager,
            router,
            target,
            token,
        }
    }

    #[test]
    fn test_patched_payload_and_approval() {
        let mut f = fixture();
        let executor = StepExecutor::new(f.router, f.manager);
        let step = Step::new(f.target, vec![0u8; 68]).with_token(StepToken::patched(f.token, 36));

        let out = executor.execute(&mut f.chain, &step).unwrap();
        assert_eq!(U256::from_be_slice(&out[36..68]), U256::from(777u64));
        assert_eq!(
            f.chain
                .ledger()
                .allowance(&f.token, &f.manager.address(), &f.target),
            U256::from(777u64)
        );
    }

    #[test]
    fn test_native_step_token_sets_value() {
        let mut f = fixture();
        let executor = StepExecutor::new(f.router, f.manager);
        let step = Step::new(f.target, vec![0u8; 4])
            .with_value(U256::from(1u64))
            .with_token(StepToken::new(NATIVE));

        let out = executor.execute(&mut f.chain, &step).unwrap();
        assert_eq!(U256::from_be_slice(&out[4..36]), U256::from(9u64));
        assert_eq!(f.chain.balance_of(&NATIVE, &f.target), U256::from(9u64));
    }

    #[test]
    fn test_out_of_bounds_patch() {
        let mut f = fixture();
        let executor = StepExecutor::new(f.router, f.manager);
        let step = Step::new(f.target, vec![0u8; 40]).with_token(StepToken::patched(f.token, 36));
        let err = executor.execute(&mut f.chain, &step).unwrap_err();
        assert_eq!(
            err,
            SettlementError::PatchOutOfBounds {
                offset: 36,
                payload_len: 40
            }
        );
    }

    #[test]
    fn test_reverting_target() {
        let mut f = fixture();
        let executor = StepExecutor::new(f.router, f.manager);
        let step = Step::new(f.target, vec![0xffu8]);
        let err = executor.execute(&mut f.chain, &step).unwrap_err();
        assert!(matches!(err, SettlementError::StepCallFailed { reason, .. } if reason.contains("nope")));
    }

    #[test]
    fn test_invalid_targets() {
        let mut f = fixture();
        let executor = StepExecutor::new(f.router, f.manager);
        for target in [Address::repeat_byte(0x44), f.manager.address(), f.router] {
            let err = executor
                .execute(&mut f.chain, &Step::new(target, Bytes::new()))
                .unwrap_err();
            assert_eq!(err, SettlementError::TargetingInvalidContract { target });
        }
    }

    #[test]
    fn test_unfunded_value_fails_the_step() {
        let mut f = fixture();
        let executor = StepExecutor::new(f.router, f.manager);
        let step = Step::new(f.target, Bytes::new()).with_value(U256::from(10u64));
        assert!(matches!(
            executor.execute(&mut f.chain, &step),
            Err(SettlementError::StepCallFailed { .. })
        ));
    }
}
