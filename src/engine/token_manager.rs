use crate::chain::state::{ChainState, CustodianRecord};
use crate::core::error::SettlementError;
use crate::core::ledger::{TokenLedger, TransferError};
use crate::core::order::Input;
use crate::core::token::is_native;
use alloy_primitives::{Address, Bytes, U256};
use log::{debug, info};

/// The custody account of the engine.
///
/// Users approve this one narrow component instead of the router, so a
/// router can be replaced without anyone re-approving anything. Everything
/// that touches custody funds goes through here and is refused unless the
/// caller is the router currently registered on the chain.
///
/// A `TokenManager` is only a handle. Its owner and router live in the
/// [`ChainState`], so every copy of a handle sees the same registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenManager {
    address: Address,
}

impl TokenManager {
    /// Register a token manager at `address`, administered by `owner`, with
    /// `router` allowed to move its funds.
    pub fn deploy(
        chain: &mut ChainState,
        address: Address,
        owner: Address,
        router: Address,
    ) -> Result<Self, SettlementError> {
        chain
            .register_custodian(address, CustodianRecord { owner, router })
            .map_err(|_| SettlementError::AlreadyDeployed { address })?;
        info!("token manager deployed at {} for router {}", address, router);
        Ok(Self { address })
    }

    /// A handle to the token manager registered at `address`.
    pub fn at(address: Address) -> Self {
        Self { address }
    }

    /// The custody account's address in the ledger.
    pub fn address(&self) -> Address {
        self.address
    }

    fn record(&self, chain: &ChainState) -> Result<CustodianRecord, SettlementError> {
        chain
            .custodian(&self.address)
            .copied()
            .ok_or(SettlementError::UnknownTokenManager {
                address: self.address,
            })
    }

    pub fn router(&self, chain: &ChainState) -> Option<Address> {
        chain.custodian(&self.address).map(|r| r.router)
    }

    pub fn owner(&self, chain: &ChainState) -> Option<Address> {
        chain.custodian(&self.address).map(|r| r.owner)
    }

    fn require_router(&self, chain: &ChainState, caller: &Address) -> Result<(), SettlementError> {
        if *caller != self.record(chain)?.router {
            return Err(SettlementError::CallerNotRouter { caller: *caller });
        }
        Ok(())
    }

    /// Register a new router. Used when the engine is upgraded.
    pub fn set_router(
        &self,
        chain: &mut ChainState,
        caller: &Address,
        router: Address,
    ) -> Result<(), SettlementError> {
        let address = self.address;
        let record = chain
            .custodian_mut(&address)
            .ok_or(SettlementError::UnknownTokenManager { address })?;
        if *caller != record.owner {
            return Err(SettlementError::Unauthorized { caller: *caller });
        }
        info!("token manager router changed from {} to {}", record.router, router);
        record.router = router;
        Ok(())
    }

    pub fn custody_balance(&self, ledger: &TokenLedger, token: &Address) -> U256 {
        ledger.balance_of(token, &self.address)
    }

    /// Take `amount` of `token` from `from` into custody using the allowance
    /// `from` granted the token manager.
    pub fn pull(
        &self,
        chain: &mut ChainState,
        caller: &Address,
        token: &Address,
        from: &Address,
        amount: U256,
    ) -> Result<(), SettlementError> {
        self.require_router(chain, caller)?;
        if is_native(token) {
            return Err(SettlementError::TransferFailed {
                token: *token,
                from: *from,
                to: self.address,
                amount,
                reason: "native currency is attached to the call, not pulled".to_string(),
            });
        }
        chain
            .ledger_mut()
            .transfer_from(token, &self.address, from, &self.address, amount)
            .map_err(|e| transfer_error(e, token, from, &self.address, amount))?;
        debug!("pulled {} of {} from {}", amount, token, from);
        Ok(())
    }

    /// Pull every non-native input of an order from `user`.
    pub fn pull_inputs(
        &self,
        chain: &mut ChainState,
        caller: &Address,
        user: &Address,
        inputs: &[Input],
    ) -> Result<(), SettlementError> {
        self.require_router(chain, caller)?;
        for input in inputs.iter().filter(|i| !is_native(&i.token)) {
            self.pull(chain, caller, &input.token, user, input.amount)?;
        }
        Ok(())
    }

    /// Send custodied `token` (or native currency) to `to`.
    pub fn forward(
        &self,
        chain: &mut ChainState,
        caller: &Address,
        token: &Address,
        to: &Address,
        amount: U256,
    ) -> Result<(), SettlementError> {
        self.require_router(chain, caller)?;
        chain
            .ledger_mut()
            .transfer(token, &self.address, to, amount)
            .map_err(|e| transfer_error(e, token, &self.address, to, amount))?;
        debug!("forwarded {} of {} to {}", amount, token, to);
        Ok(())
    }

    /// Let `spender` take up to `amount` of custodied `token`.
    pub fn approve(
        &self,
        chain: &mut ChainState,
        caller: &Address,
        token: &Address,
        spender: &Address,
        amount: U256,
    ) -> Result<(), SettlementError> {
        self.require_router(chain, caller)?;
        chain
            .ledger_mut()
            .approve(token, &self.address, spender, amount);
        Ok(())
    }

    /// Call `target` from the custody account, attaching `value` native.
    ///
    /// Any failure of the call, including custody being unable to fund
    /// `value`, becomes `StepCallFailed`.
    pub fn dispatch(
        &self,
        chain: &mut ChainState,
        caller: &Address,
        target: Address,
        value: U256,
        data: &[u8],
    ) -> Result<Bytes, SettlementError> {
        self.require_router(chain, caller)?;
        chain
            .call(self.address, target, value, data)
            .map_err(|revert| SettlementError::StepCallFailed {
                target,
                value,
                data: Bytes::copy_from_slice(data),
                reason: revert.reason,
            })
    }
}

fn transfer_error(
    err: TransferError,
    token: &Address,
    from: &Address,
    to: &Address,
    amount: U256,
) -> SettlementError {
    match err {
        TransferError::InsufficientAllowance {
            token,
            owner,
            spender,
            allowance,
            required,
        } => SettlementError::InsufficientAllowance {
            token,
            owner,
            spender,
            allowance,
            required,
        },
        other => SettlementError::TransferFailed {
            token: *token,
            from: *from,
            to: *to,
            amount,
            reason: other.to_string(),
        },
    }
}
