//! # Repository Layer
//!
//! Data access for the ledger store. Each repository wraps the shared
//! pool and speaks domain types from vendo-core; SQL never leaks past
//! this module.

pub mod stock;
pub mod transaction;

pub use stock::StockRepository;
pub use transaction::{TransactionFilter, TransactionRepository};
