//! # vendo-ledger: Ledger & Inventory Layer for Vendo POS
//!
//! SQLite persistence and orchestration for the sales ledger: recording
//! transactions, processing refunds and cancellations with optimistic
//! concurrency, and applying cart-side stock reservations.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        vendo-ledger                                 │
//! │                                                                     │
//! │  ┌──────────────────┐      ┌──────────────────────────────────┐    │
//! │  │  LedgerService   │      │       ReservationWorker          │    │
//! │  │                  │      │                                  │    │
//! │  │  record / refund │      │  StockOp queue ──► atomic stock  │    │
//! │  │  cancel / query  │      │  deltas (best-effort, isolated)  │    │
//! │  └────────┬─────────┘      └───────────────┬──────────────────┘    │
//! │           │                                │                       │
//! │  ┌────────▼────────────────────────────────▼──────────────────┐    │
//! │  │                     Repositories                           │    │
//! │  │   TransactionRepository (CAS writes) • StockRepository     │    │
//! │  └────────────────────────────┬───────────────────────────────┘    │
//! │                               │                                    │
//! │  ┌────────────────────────────▼───────────────────────────────┐    │
//! │  │            SQLite (WAL) + embedded migrations              │    │
//! │  └────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All business math lives in [`vendo_core`]; this crate supplies state,
//! atomicity and retries.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod reservation;
pub mod service;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{LedgerError, LedgerResult};
pub use pool::{Database, DbConfig};
pub use repository::{StockRepository, TransactionFilter, TransactionRepository};
pub use reservation::{ReservationHandle, ReservationWorker};
pub use service::LedgerService;
