//! # Validation Module
//!
//! Structural validation of transaction drafts before they hit the ledger.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                              │
//! │                                                                     │
//! │  Layer 1: Checkout (freeze_transaction)                             │
//! │  └── Computes totals itself, so its drafts are consistent           │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 2: THIS MODULE (record_transaction)                          │
//! │  └── Drafts may also arrive from external callers; re-check         │
//! │      everything before the write                                    │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 3: Database constraints (NOT NULL, PK, FK)                   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::Transaction;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a transaction draft ahead of the ledger write.
///
/// ## Rules
/// - non-empty id and items
/// - every line quantity in 1..=MAX_ITEM_QUANTITY, prices non-negative
/// - `item_index` values match snapshot positions (they are permanent
///   identity, so they must be right from the start)
/// - `subtotal == Σ unit price × quantity`
/// - `discount ≤ subtotal`, `total == subtotal − discount + tax`
pub fn validate_transaction_draft(transaction: &Transaction) -> ValidationResult<()> {
    if transaction.transaction_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "transaction_id",
        });
    }
    if transaction.items.is_empty() {
        return Err(ValidationError::Required { field: "items" });
    }

    let mut subtotal = 0i64;
    for (position, item) in transaction.items.iter().enumerate() {
        if item.item_index != position {
            return Err(ValidationError::IndexMismatch {
                expected: position,
                actual: item.item_index,
            });
        }
        if item.quantity <= 0 || item.quantity > MAX_ITEM_QUANTITY {
            return Err(ValidationError::OutOfRange {
                field: "quantity",
                min: 1,
                max: MAX_ITEM_QUANTITY,
            });
        }
        if item.unit_price_cents < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "unit_price_cents",
                value: item.unit_price_cents,
            });
        }
        if item.stock_id.trim().is_empty() {
            return Err(ValidationError::Required { field: "stock_id" });
        }
        subtotal += item.unit_price_cents * item.quantity;
    }

    if transaction.subtotal_cents != subtotal {
        return Err(ValidationError::InconsistentTotals {
            field: "subtotal_cents",
            expected_cents: subtotal,
            actual_cents: transaction.subtotal_cents,
        });
    }
    if transaction.discount_cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "discount_cents",
            value: transaction.discount_cents,
        });
    }
    if transaction.discount_cents > transaction.subtotal_cents {
        return Err(ValidationError::DiscountExceedsSubtotal {
            discount_cents: transaction.discount_cents,
            subtotal_cents: transaction.subtotal_cents,
        });
    }
    if transaction.tax_cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "tax_cents",
            value: transaction.tax_cents,
        });
    }

    let expected_total =
        transaction.subtotal_cents - transaction.discount_cents + transaction.tax_cents;
    if transaction.total_cents != expected_total {
        return Err(ValidationError::InconsistentTotals {
            field: "total_cents",
            expected_cents: expected_total,
            actual_cents: transaction.total_cents,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentMethod, TransactionItem, TransactionStatus};
    use chrono::Utc;

    fn draft() -> Transaction {
        Transaction {
            transaction_id: "txn-1".into(),
            items: vec![TransactionItem {
                item_index: 0,
                item_id: "line-1".into(),
                stock_id: "stk-1".into(),
                color: "black".into(),
                size: "M".into(),
                quantity: 2,
                unit_price_cents: 5000,
                original_price_cents: 5000,
                discounted_price_cents: None,
            }],
            subtotal_cents: 10000,
            tax_cents: 500,
            discount_cents: 1000,
            total_cents: 9500,
            amount_paid_cents: 10000,
            change_cents: 500,
            payment_method: PaymentMethod::Cash,
            status: TransactionStatus::Completed,
            refunds: Vec::new(),
            cancelled_at: None,
            cancel_reason: None,
            cancelled_by: None,
            created_at: Utc::now(),
            version: 0,
        }
    }

    #[test]
    fn test_valid_draft_passes() {
        assert!(validate_transaction_draft(&draft()).is_ok());
    }

    #[test]
    fn test_empty_items_rejected() {
        let mut tx = draft();
        tx.items.clear();
        tx.subtotal_cents = 0;
        assert!(validate_transaction_draft(&tx).is_err());
    }

    #[test]
    fn test_subtotal_mismatch_rejected() {
        let mut tx = draft();
        tx.subtotal_cents = 9999;
        assert!(matches!(
            validate_transaction_draft(&tx).unwrap_err(),
            ValidationError::InconsistentTotals {
                field: "subtotal_cents",
                ..
            }
        ));
    }

    #[test]
    fn test_total_mismatch_rejected() {
        let mut tx = draft();
        tx.total_cents = 9000;
        assert!(matches!(
            validate_transaction_draft(&tx).unwrap_err(),
            ValidationError::InconsistentTotals {
                field: "total_cents",
                ..
            }
        ));
    }

    #[test]
    fn test_bad_item_index_rejected() {
        let mut tx = draft();
        tx.items[0].item_index = 3;
        assert!(validate_transaction_draft(&tx).is_err());
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut tx = draft();
        tx.items[0].quantity = 0;
        assert!(validate_transaction_draft(&tx).is_err());
    }
}
