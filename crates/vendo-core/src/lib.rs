//! # vendo-core: Pure Business Logic for Vendo POS
//!
//! This crate is the **heart** of the sales ledger: all refund,
//! cancellation, cart and money logic as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     Vendo POS Architecture                          │
//! │                                                                     │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │                Calling UI / report layers                     │  │
//! │  │              (external to this workspace)                     │  │
//! │  └──────────────────────────────┬────────────────────────────────┘  │
//! │                                 │                                   │
//! │  ┌──────────────────────────────▼────────────────────────────────┐  │
//! │  │                  vendo-ledger (I/O layer)                     │  │
//! │  │   LedgerService • repositories • reservation worker           │  │
//! │  └──────────────────────────────┬────────────────────────────────┘  │
//! │                                 │                                   │
//! │  ┌──────────────────────────────▼────────────────────────────────┐  │
//! │  │               ★ vendo-core (THIS CRATE) ★                     │  │
//! │  │                                                               │  │
//! │  │  ┌────────┐ ┌───────┐ ┌──────┐ ┌────────┐ ┌──────────────┐   │  │
//! │  │  │ money  │ │ types │ │ cart │ │ refund │ │  checkout /  │   │  │
//! │  │  │        │ │       │ │      │ │        │ │  validation  │   │  │
//! │  │  └────────┘ └───────┘ └──────┘ └────────┘ └──────────────┘   │  │
//! │  │                                                               │  │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS          │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer-cent money with single-rounding proportional splits
//! - [`types`] - Domain types (Transaction, Refund, StockKey, statuses)
//! - [`cart`] - Cart math, stock availability policy, reservation events
//! - [`refund`] - Refund and cancellation planning
//! - [`checkout`] - Freezing a cart into a transaction draft
//! - [`validation`] - Structural draft validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: a refund plan is a deterministic function of the
//!    frozen snapshot, the refund history and the request
//! 2. **No I/O**: database, network and file system access are FORBIDDEN
//! 3. **Integer Money**: all monetary values are cents (i64); proportional
//!    splits round exactly once, half-up
//! 4. **Explicit Errors**: typed errors carrying the offending quantities

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod checkout;
pub mod error;
pub mod money;
pub mod refund;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartItem, StockSnapshot};
pub use checkout::{freeze_transaction, CheckoutRequest};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use refund::{
    plan_cancellation, plan_refund, refunded_quantities, LineKey, RefundPlan, RefundRequest,
};
pub use types::*;
pub use validation::{validate_transaction_draft, ValidationResult};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
///
/// Prevents runaway carts and keeps transaction snapshots bounded.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// Guards against typo-sized orders (1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;
