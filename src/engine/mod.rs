pub mod balances;
pub mod executor;
pub mod patcher;
pub mod router;
pub mod settings;
pub mod token_manager;
