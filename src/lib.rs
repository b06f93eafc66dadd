//! # settlement-engine
//!
//! Atomic order settlement against untrusted external contracts.
//!
//! A caller hands over a set of input tokens, a route of opaque external
//! calls produced by an off-chain quoting service, and the minimum amounts
//! they expect back. The engine pulls the inputs into custody, executes the
//! route step by step (injecting live balances into call payloads where
//! asked), checks every declared output against its minimum and pays out.
//! Any failure discards every effect of the settlement.
//!
//! ## Architecture
//!
//! - **core**: Shared types: tokens and amounts, orders, steps, the token
//!   ledger, events, errors
//! - **chain**: Execution substrate: the `Contract` trait and `ChainState`
//!   with its staging boundary
//! - **engine**: Token manager, call patcher, step executor, balance
//!   tracking and the order router
//! - **collaborators**: `sol!` interfaces and reference vault, pool and fee
//!   configuration contracts
//! - **simulation**: JSON scenarios and random scenario generation

pub mod chain;
pub mod collaborators;
pub mod core;
pub mod engine;
pub mod simulation;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::chain::contract::{CallContext, Contract, Revert};
    pub use crate::chain::state::{ChainState, CustodianRecord};
    pub use crate::core::error::SettlementError;
    pub use crate::core::events::Event;
    pub use crate::core::ledger::TokenLedger;
    pub use crate::core::order::{Input, Order, Output, Relay, RelayTiming};
    pub use crate::core::step::{PatchIndex, Route, Step, StepToken, TrustedRoute};
    pub use crate::core::token::NATIVE;
    pub use crate::engine::router::{OrderRouter, SettlementReceipt};
    pub use crate::engine::settings::RouterSettings;
    pub use crate::engine::token_manager::TokenManager;
}
