//! # Domain Types
//!
//! Core domain types for the sales ledger and inventory reservation core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                │
//! │                                                                     │
//! │  ┌────────────────┐   ┌────────────────┐   ┌────────────────┐      │
//! │  │  Transaction   │   │     Refund     │   │    StockKey    │      │
//! │  │ ────────────── │   │ ────────────── │   │ ────────────── │      │
//! │  │ transaction_id │   │ refund_id      │   │ stock_id       │      │
//! │  │ items (frozen) │   │ items[idx,qty] │   │ color          │      │
//! │  │ status         │   │ total_amount   │   │ size           │      │
//! │  │ refunds[]      │   │ tax (audit)    │   └────────────────┘      │
//! │  └────────────────┘   └────────────────┘                           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Frozen Items Pattern
//! A transaction's `items` are a snapshot taken at checkout and are never
//! mutated, reordered or removed afterwards. The position of a line in that
//! snapshot (`item_index`) is its permanent identity; every refund refers
//! back to it. Refunds accumulate against the transaction and are themselves
//! immutable once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::money::Money;

// =============================================================================
// Payment Method
// =============================================================================

/// How a transaction was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// QR / barcode scan payment.
    Scan,
    /// Digital wallet.
    Wallet,
    /// Cash on delivery.
    Cod,
}

impl PaymentMethod {
    /// Stable text form used by the backing store.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Scan => "scan",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Cod => "cod",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "scan" => Ok(PaymentMethod::Scan),
            "wallet" => Ok(PaymentMethod::Wallet),
            "cod" => Ok(PaymentMethod::Cod),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transaction Status
// =============================================================================

/// The status state machine of a ledger transaction.
///
/// ```text
/// pending ──► completed ──► partially_refunded ──► refunded (terminal)
///                 │                  │
///                 │                  └────────────► cancelled (terminal)
///                 └───────────────────────────────► cancelled (terminal)
/// ```
///
/// Status is always **derived** from the accumulated refund history (see
/// [`TransactionStatus::derive`]), never toggled or counted up. Re-running
/// the same derivation is idempotent, which makes retried writes safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting completion (e.g. COD not yet delivered).
    Pending,
    /// Paid and finalized; the normal resting state.
    Completed,
    /// Some but not all of the refundable amount has been returned.
    PartiallyRefunded,
    /// The full refundable amount has been returned. Terminal.
    Refunded,
    /// Explicitly cancelled; remaining stock restored. Terminal.
    Cancelled,
}

impl TransactionStatus {
    /// Stable text form used by the backing store.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::PartiallyRefunded => "partially_refunded",
            TransactionStatus::Refunded => "refunded",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states admit no further transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Refunded | TransactionStatus::Cancelled)
    }

    /// Whether a refund may be processed in this state.
    pub const fn can_refund(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed | TransactionStatus::PartiallyRefunded
        )
    }

    /// Whether the transaction may still be cancelled.
    pub const fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Derives the status from accumulated refund totals.
    ///
    /// `refunded_total` is the sum of all refund `total_amount`s written so
    /// far; `refundable` is the ceiling (`subtotal − cart discount`). The
    /// derivation is a pure function of those two figures:
    ///
    /// - nothing refunded      → `Completed`
    /// - some, below ceiling   → `PartiallyRefunded`
    /// - at or above ceiling   → `Refunded`
    pub fn derive(refunded_total: Money, refundable: Money) -> TransactionStatus {
        if !refunded_total.is_positive() {
            TransactionStatus::Completed
        } else if refunded_total >= refundable {
            TransactionStatus::Refunded
        } else {
            TransactionStatus::PartiallyRefunded
        }
    }
}

impl Default for TransactionStatus {
    fn default() -> Self {
        TransactionStatus::Completed
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "partially_refunded" => Ok(TransactionStatus::PartiallyRefunded),
            "refunded" => Ok(TransactionStatus::Refunded),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Stock Key
// =============================================================================

/// Identifies one physical stock bucket: a variant (color) of a stock item
/// in a particular size. All inventory movement is keyed by this triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub stock_id: String,
    pub color: String,
    pub size: String,
}

impl StockKey {
    pub fn new(
        stock_id: impl Into<String>,
        color: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        StockKey {
            stock_id: stock_id.into(),
            color: color.into(),
            size: size.into(),
        }
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.stock_id, self.color, self.size)
    }
}

/// A bounded inventory delta: restore `quantity` units to one stock bucket.
///
/// Used by refunds (per refunded line) and cancellation (per remaining
/// line, batched).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRestoration {
    pub key: StockKey,
    pub quantity: i64,
}

/// A signed stock mutation produced by a cart edit and consumed by the
/// reservation queue. Increases in cart quantity reduce stock; decreases
/// and removals restore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum StockOp {
    Reduce { key: StockKey, quantity: i64 },
    Restore { key: StockKey, quantity: i64 },
}

impl StockOp {
    /// The stock bucket this operation touches.
    pub fn key(&self) -> &StockKey {
        match self {
            StockOp::Reduce { key, .. } | StockOp::Restore { key, .. } => key,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A single frozen line of a transaction.
///
/// `item_index` is the line's position in the snapshot at checkout time and
/// is its permanent identity - refunds reference lines by this index, so
/// lines are never reordered or removed after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionItem {
    /// Permanent identity of this line within the transaction.
    pub item_index: usize,
    /// The cart line id this was frozen from.
    pub item_id: String,
    pub stock_id: String,
    pub color: String,
    pub size: String,
    /// Units sold. Always > 0.
    pub quantity: i64,
    /// Effective unit price at checkout.
    pub unit_price_cents: i64,
    /// Immutable list-price baseline.
    pub original_price_cents: i64,
    /// Price after line-level discounts, when any were applied.
    pub discounted_price_cents: Option<i64>,
}

impl TransactionItem {
    /// The price the customer actually paid per unit.
    ///
    /// Refund math always starts from this figure, never from the original
    /// list price.
    #[inline]
    pub fn actual_price_paid(&self) -> Money {
        Money::from_cents(self.discounted_price_cents.unwrap_or(self.unit_price_cents))
    }

    /// The stock bucket this line draws from.
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(
            self.stock_id.clone(),
            self.color.clone(),
            self.size.clone(),
        )
    }
}

/// A completed sale in the transaction ledger.
///
/// Created once at checkout with a frozen item snapshot and authoritative
/// totals. Afterwards only `status`, the append-only `refunds` list and the
/// cancellation stamp may change - each such write bumps `version`, which
/// the storage layer uses for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique, caller-generated identifier.
    pub transaction_id: String,
    /// Frozen snapshot of the cart at checkout. Never mutated.
    pub items: Vec<TransactionItem>,
    /// Sum of unit price × quantity across items.
    pub subtotal_cents: i64,
    /// Tax charged at checkout (computed on subtotal − discount).
    pub tax_cents: i64,
    /// Cart-level discount. Not stored per line; refunds apportion it.
    pub discount_cents: i64,
    /// subtotal − discount + tax.
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub change_cents: i64,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    /// Accumulated refunds, append-only, in submission order.
    pub refunds: Vec<Refund>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Optimistic-concurrency counter, bumped on every status/refund write.
    pub version: i64,
}

impl Transaction {
    /// The ceiling against which cumulative refunds are checked:
    /// subtotal minus the cart-level discount. Tax is excluded - it is
    /// never returned to the customer.
    #[inline]
    pub fn refundable_cents(&self) -> Money {
        Money::from_cents(self.subtotal_cents - self.discount_cents)
    }

    /// Total amount already refunded across all prior refunds.
    pub fn refunded_total(&self) -> Money {
        self.refunds
            .iter()
            .fold(Money::zero(), |acc, r| acc + Money::from_cents(r.total_amount_cents))
    }
}

// =============================================================================
// Refund
// =============================================================================

/// Processing state of a refund record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Written to the ledger; financially authoritative.
    Completed,
}

impl RefundStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Completed => "completed",
        }
    }
}

impl FromStr for RefundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(RefundStatus::Completed),
            other => Err(format!("unknown refund status: {other}")),
        }
    }
}

/// One refunded line: a quantity taken back against a frozen transaction
/// line. The stock key is copied in so inventory restoration does not need
/// to re-read the parent transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundItem {
    /// Index into the parent transaction's frozen items.
    pub item_index: usize,
    pub stock_id: String,
    pub color: String,
    pub size: String,
    /// Units refunded by this record. Always > 0.
    pub quantity: i64,
}

impl RefundItem {
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(
            self.stock_id.clone(),
            self.color.clone(),
            self.size.clone(),
        )
    }
}

/// A refund written against a transaction. Immutable once recorded.
///
/// `total_amount_cents` is what the customer gets back:
/// `items_subtotal − cart_discount_refund`. The proportional tax share is
/// recorded in `tax_refund_cents` for audit but is **not** part of the
/// payout - tax is never returned to the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub refund_id: String,
    pub transaction_id: String,
    pub items: Vec<RefundItem>,
    /// Σ actual price paid × refunded quantity.
    pub items_subtotal_cents: i64,
    /// Proportional share of the cart-level discount.
    pub cart_discount_refund_cents: i64,
    /// Proportional tax share, recorded for audit only.
    pub tax_refund_cents: i64,
    /// items_subtotal − cart_discount_refund. Excludes tax.
    pub total_amount_cents: i64,
    pub status: RefundStatus,
    pub reason: Option<String>,
    pub refunded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
