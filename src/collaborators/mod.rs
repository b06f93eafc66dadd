//! Reference contracts the engine is exercised against.
//!
//! None of these are part of settlement. They stand in for the vaults,
//! pools and fee stores a real route would touch.

pub mod amm;
pub mod calldata;
pub mod fee_config;
pub mod vault;
