use alloy_primitives::{Address, Bytes, U256};
use thiserror::Error;

/// Why a settlement, or an administrative action on the engine, failed.
///
/// Every variant is terminal: nothing is retried and no partial effect of
/// the failed settlement survives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("insufficient allowance: {owner} allows {spender} {allowance} of {token}, needs {required}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        allowance: U256,
        required: U256,
    },
    #[error("transfer of {amount} {token} from {from} to {to} failed: {reason}")]
    TransferFailed {
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
        reason: String,
    },
    #[error("caller {caller} is not the registered router")]
    CallerNotRouter { caller: Address },
    #[error("patch at offset {offset} does not fit a {payload_len}-byte payload")]
    PatchOutOfBounds { offset: usize, payload_len: usize },
    #[error("call to {target} with value {value} failed: {reason} (data {data:?})")]
    StepCallFailed {
        target: Address,
        value: U256,
        data: Bytes,
        reason: String,
    },
    #[error("{target} is not a valid call target")]
    TargetingInvalidContract { target: Address },
    #[error("slippage on {token}: wanted at least {min_output_amount}, got {balance}")]
    Slippage {
        token: Address,
        min_output_amount: U256,
        balance: U256,
    },
    #[error("router is paused")]
    Paused,
    #[error("relay needs {relay_value} native but custody holds {balance}")]
    InsufficientRelayValue { balance: U256, relay_value: U256 },
    #[error("native inputs need {required} but {attached} was attached")]
    InsufficientNativeValue { attached: U256, required: U256 },
    #[error("caller {caller} may not settle orders of {user}")]
    InvalidCaller { user: Address, caller: Address },
    #[error("order has no inputs")]
    EmptyInputs,
    #[error("caller {caller} is not authorized")]
    Unauthorized { caller: Address },
    #[error("{address} is already deployed")]
    AlreadyDeployed { address: Address },
    #[error("no token manager is registered at {address}")]
    UnknownTokenManager { address: Address },
}

impl SettlementError {
    /// Short machine-friendly name of the variant, used in logs and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            SettlementError::InsufficientAllowance { .. } => "InsufficientAllowance",
            SettlementError::TransferFailed { .. } => "TransferFailed",
            SettlementError::CallerNotRouter { .. } => "CallerNotRouter",
            SettlementError::PatchOutOfBounds { .. } => "PatchOutOfBounds",
            SettlementError::StepCallFailed { .. } => "StepCallFailed",
            SettlementError::TargetingInvalidContract { .. } => "TargetingInvalidContract",
            SettlementError::Slippage { .. } => "Slippage",
            SettlementError::Paused => "Paused",
            SettlementError::InsufficientRelayValue { .. } => "InsufficientRelayValue",
            SettlementError::InsufficientNativeValue { .. } => "InsufficientNativeValue",
            SettlementError::InvalidCaller { .. } => "InvalidCaller",
            SettlementError::EmptyInputs => "EmptyInputs",
            SettlementError::Unauthorized { .. } => "Unauthorized",
            SettlementError::AlreadyDeployed { .. } => "AlreadyDeployed",
            SettlementError::UnknownTokenManager { .. } => "UnknownTokenManager",
        }
    }
}
