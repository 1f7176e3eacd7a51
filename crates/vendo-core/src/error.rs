//! # Error Types
//!
//! Domain-specific error types for vendo-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                 │
//! │                                                                     │
//! │  vendo-core errors (this file)                                      │
//! │  ├── CoreError        - Business-rule violations                    │
//! │  └── ValidationError  - Input shape/consistency failures            │
//! │                                                                     │
//! │  vendo-ledger errors (separate crate)                               │
//! │  └── LedgerError      - Storage and concurrency failures            │
//! │                                                                     │
//! │  Flow: ValidationError → CoreError → LedgerError → caller           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Carry the offending quantities so callers can surface them verbatim
//!    ("only N available to refund")
//! 3. Errors are enum variants, never String

use thiserror::Error;

use crate::types::TransactionStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Business-rule violations.
///
/// All of these are detected synchronously, before any write happens, so a
/// rejected operation leaves the ledger and inventory untouched.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The refund request contained no refundable lines.
    ///
    /// Zero-quantity lines are silently skipped, so a request made up
    /// entirely of them lands here.
    #[error("nothing to refund")]
    NothingToRefund,

    /// The requested line does not exist in the transaction's frozen
    /// snapshot, or the line id no longer matches the index.
    #[error("line {item_index} not found in transaction {transaction_id}")]
    LineNotFound {
        transaction_id: String,
        item_index: usize,
    },

    /// Requested more units than remain unrefunded on a line.
    ///
    /// ## User Workflow
    /// ```text
    /// Refund request (line 0, qty 8)
    ///      │
    ///      ▼
    /// sold 10, already refunded 3 → remaining 7
    ///      │
    ///      ▼
    /// UI shows: "only 7 available to refund"
    /// ```
    #[error("line {item_index}: requested {requested}, only {remaining} available to refund")]
    RefundExceedsRemaining {
        item_index: usize,
        requested: i64,
        remaining: i64,
    },

    /// The refund would push cumulative refunds past the refundable
    /// ceiling (subtotal − cart discount).
    #[error("refund of {requested_cents} exceeds remaining refundable amount {remaining_cents}")]
    RefundExceedsCap {
        requested_cents: i64,
        remaining_cents: i64,
    },

    /// The transaction's status does not admit the requested operation.
    #[error("transaction {transaction_id} is {status}, cannot {operation}")]
    InvalidStatus {
        transaction_id: String,
        status: TransactionStatus,
        operation: &'static str,
    },

    /// Not enough physical stock to honor a cart increase.
    #[error("insufficient stock for {stock_key}: available {available}, requested {requested}")]
    InsufficientStock {
        stock_key: String,
        available: i64,
        requested: i64,
    },

    /// The referenced cart line does not exist.
    #[error("item {item_id} not in cart")]
    ItemNotInCart { item_id: String },

    /// Cart has exceeded maximum allowed lines.
    #[error("cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These fire when a request or draft doesn't hold together structurally,
/// before any business rule is evaluated.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: &'static str },

    /// Value must be strictly positive.
    #[error("{field} must be positive, got {value}")]
    MustBePositive { field: &'static str, value: i64 },

    /// Value must not be negative.
    #[error("{field} must not be negative, got {value}")]
    MustNotBeNegative { field: &'static str, value: i64 },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: &'static str, min: i64, max: i64 },

    /// A line's frozen index disagrees with its position in the snapshot.
    #[error("item_index {actual} does not match snapshot position {expected}")]
    IndexMismatch { expected: usize, actual: usize },

    /// A transaction draft's stored totals disagree with its items.
    #[error("inconsistent {field}: expected {expected_cents}, got {actual_cents}")]
    InconsistentTotals {
        field: &'static str,
        expected_cents: i64,
        actual_cents: i64,
    },

    /// Cart-level discount larger than the subtotal it discounts.
    #[error("discount {discount_cents} exceeds subtotal {subtotal_cents}")]
    DiscountExceedsSubtotal {
        discount_cents: i64,
        subtotal_cents: i64,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
