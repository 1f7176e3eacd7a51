//! # Checkout
//!
//! Freezes a cart into a transaction draft: the item snapshot is fixed, the
//! authoritative totals are computed exactly once, and the cart is done.
//!
//! ```text
//! Cart ──► freeze_transaction() ──► Transaction { items frozen,
//!                                                 subtotal/tax/total set,
//!                                                 status: Completed }
//! ```
//!
//! Tax is charged on `subtotal − cart discount`. `item_index` is assigned
//! here from the snapshot position and becomes each line's permanent
//! identity; nothing downstream ever recomputes it.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cart::Cart;
use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{PaymentMethod, Transaction, TransactionItem, TransactionStatus};

/// Everything checkout needs beyond the cart itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Caller-generated unique transaction id.
    pub transaction_id: String,
    pub payment_method: PaymentMethod,
    pub amount_paid_cents: i64,
    /// Cart-level discount in cents (not stored per line).
    pub cart_discount_cents: i64,
    /// Tax rate in basis points, applied to subtotal − discount.
    pub tax_rate_bps: u32,
}

/// Freezes `cart` into a transaction draft.
///
/// The cart itself is not consumed or cleared here; the caller clears it
/// (and lets the reservation queue settle) once the ledger write succeeds.
pub fn freeze_transaction(cart: &Cart, request: &CheckoutRequest) -> CoreResult<Transaction> {
    if request.transaction_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "transaction_id",
        }
        .into());
    }
    if cart.is_empty() {
        return Err(ValidationError::Required { field: "items" }.into());
    }
    if request.cart_discount_cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "cart_discount_cents",
            value: request.cart_discount_cents,
        }
        .into());
    }

    let subtotal = Money::from_cents(cart.subtotal_cents());
    let discount = Money::from_cents(request.cart_discount_cents);
    if discount > subtotal {
        return Err(ValidationError::DiscountExceedsSubtotal {
            discount_cents: discount.cents(),
            subtotal_cents: subtotal.cents(),
        }
        .into());
    }

    let tax = (subtotal - discount).calculate_tax(request.tax_rate_bps);
    let total = subtotal - discount + tax;
    let paid = Money::from_cents(request.amount_paid_cents);
    if paid < total {
        return Err(ValidationError::OutOfRange {
            field: "amount_paid_cents",
            min: total.cents(),
            max: i64::MAX,
        }
        .into());
    }

    let items = cart
        .items
        .iter()
        .enumerate()
        .map(|(item_index, item)| TransactionItem {
            item_index,
            item_id: item.id.clone(),
            stock_id: item.stock_id.clone(),
            color: item.color.clone(),
            size: item.size.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            original_price_cents: item.original_price_cents,
            discounted_price_cents: item.discounted_price_cents,
        })
        .collect();

    Ok(Transaction {
        transaction_id: request.transaction_id.clone(),
        items,
        subtotal_cents: subtotal.cents(),
        tax_cents: tax.cents(),
        discount_cents: discount.cents(),
        total_cents: total.cents(),
        amount_paid_cents: paid.cents(),
        change_cents: (paid - total).cents(),
        payment_method: request.payment_method,
        status: TransactionStatus::Completed,
        refunds: Vec::new(),
        cancelled_at: None,
        cancel_reason: None,
        cancelled_by: None,
        created_at: Utc::now(),
        version: 0,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
