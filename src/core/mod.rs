pub mod error;
pub mod events;
pub mod ledger;
pub mod order;
pub mod step;
pub mod token;
