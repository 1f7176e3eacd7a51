//! # Refund & Cancellation Planning
//!
//! Pure computation of refund amounts and cancellation restorations.
//! Nothing here touches storage: a plan is a deterministic function of the
//! transaction's frozen snapshot, its accumulated refund history and the
//! request. The ledger layer validates, writes and retries around these
//! functions.
//!
//! ## Refund Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        plan_refund()                                │
//! │                                                                     │
//! │  1. Sum prior refund quantities per item_index                      │
//! │  2. Per requested line:                                             │
//! │     • skip qty 0                                                    │
//! │     • reject qty > (sold − already refunded)                        │
//! │     • amount = actual price paid × qty   (never the list price)     │
//! │  3. cart_discount_refund = items_subtotal / subtotal × discount     │
//! │  4. tax_refund = (items_subtotal − discount share)                  │
//! │                  / (subtotal − discount) × tax     (audit only)     │
//! │  5. total_amount = items_subtotal − cart_discount_refund            │
//! │  6. reject if prior total + total_amount > subtotal − discount      │
//! │  7. derive the status the transaction will hold after the write     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cart-level discount is not stored per line, so step 3 splits it
//! proportionally by each line's share of the transaction subtotal. Tax is
//! apportioned over the amount *after* the discount share and recorded for
//! audit, but it is never added to the payout.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Refund, RefundItem, StockRestoration, Transaction, TransactionStatus};

// =============================================================================
// Request Types
// =============================================================================

/// Identifies one line of a refund request.
///
/// Carries both the frozen index and the line id it was created from; the
/// planner cross-checks the two so a stale UI can never refund the wrong
/// line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineKey {
    pub item_id: String,
    pub item_index: usize,
}

impl LineKey {
    pub fn new(item_id: impl Into<String>, item_index: usize) -> Self {
        LineKey {
            item_id: item_id.into(),
            item_index,
        }
    }
}

/// Quantities to refund, keyed by line. BTreeMap keeps iteration order
/// deterministic, which keeps plans reproducible.
pub type RefundRequest = BTreeMap<LineKey, i64>;

// =============================================================================
// Refund Plan
// =============================================================================

/// The validated outcome of a refund computation, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundPlan {
    /// The lines being refunded, with stock keys for restoration.
    pub items: Vec<RefundItem>,
    /// Σ actual price paid × refunded quantity.
    pub items_subtotal: Money,
    /// Proportional share of the cart-level discount.
    pub cart_discount_refund: Money,
    /// Proportional tax share. Audit only; excluded from the payout.
    pub tax_refund: Money,
    /// items_subtotal − cart_discount_refund.
    pub total_amount: Money,
    /// Status the transaction holds once this plan is committed.
    pub status_after: TransactionStatus,
}

// =============================================================================
// Planning Functions
// =============================================================================

/// Sums already-refunded quantity per `item_index` across prior refunds.
///
/// Every refund and cancellation recomputes this from the full history at
/// call time rather than keeping a counter, so retried or re-entrant calls
/// always validate against what was actually written.
pub fn refunded_quantities(refunds: &[Refund]) -> HashMap<usize, i64> {
    let mut map: HashMap<usize, i64> = HashMap::new();
    for refund in refunds {
        for item in &refund.items {
            *map.entry(item.item_index).or_insert(0) += item.quantity;
        }
    }
    map
}

/// Computes a refund plan for `request` against `transaction`.
///
/// Rejects (without side effects) when:
/// - the transaction status does not admit refunds
/// - a line key is unknown or mismatched
/// - a quantity is negative, or exceeds what remains unrefunded on a line
/// - nothing refundable remains after skipping zero-quantity lines
/// - the payout would push cumulative refunds past `subtotal − discount`
///
/// Rounding happens once per aggregate (discount share, tax share), in
/// i128, half-up - refunding a transaction line by line lands within one
/// cent of refunding it in a single call.
pub fn plan_refund(transaction: &Transaction, request: &RefundRequest) -> CoreResult<RefundPlan> {
    if !transaction.status.can_refund() {
        return Err(CoreError::InvalidStatus {
            transaction_id: transaction.transaction_id.clone(),
            status: transaction.status,
            operation: "refund",
        });
    }

    let already = refunded_quantities(&transaction.refunds);

    let mut items = Vec::new();
    let mut items_subtotal = Money::zero();

    for (key, &quantity) in request {
        if quantity == 0 {
            // Zero-quantity lines are skipped, not an error.
            continue;
        }
        if quantity < 0 {
            return Err(ValidationError::MustBePositive {
                field: "refund quantity",
                value: quantity,
            }
            .into());
        }

        let item = transaction
            .items
            .get(key.item_index)
            .filter(|item| item.item_id == key.item_id)
            .ok_or_else(|| CoreError::LineNotFound {
                transaction_id: transaction.transaction_id.clone(),
                item_index: key.item_index,
            })?;

        let remaining = item.quantity - already.get(&key.item_index).copied().unwrap_or(0);
        if quantity > remaining {
            return Err(CoreError::RefundExceedsRemaining {
                item_index: key.item_index,
                requested: quantity,
                remaining,
            });
        }

        items_subtotal += item.actual_price_paid().multiply_quantity(quantity);
        items.push(RefundItem {
            item_index: key.item_index,
            stock_id: item.stock_id.clone(),
            color: item.color.clone(),
            size: item.size.clone(),
            quantity,
        });
    }

    if items.is_empty() {
        return Err(CoreError::NothingToRefund);
    }

    let subtotal = Money::from_cents(transaction.subtotal_cents);
    let discount = Money::from_cents(transaction.discount_cents);
    let tax = Money::from_cents(transaction.tax_cents);
    let refundable = transaction.refundable_cents();

    // Cart-level discount share, proportional to this refund's slice of
    // the full subtotal.
    let cart_discount_refund = items_subtotal.proportion_of(discount, subtotal);

    // Tax share, proportional over the amount after the discount share.
    let after_discount = items_subtotal - cart_discount_refund;
    let tax_refund = after_discount.proportion_of(tax, refundable);

    let total_amount = items_subtotal - cart_discount_refund;

    let prior_total = transaction.refunded_total();
    if prior_total + total_amount > refundable {
        return Err(CoreError::RefundExceedsCap {
            requested_cents: total_amount.cents(),
            remaining_cents: (refundable - prior_total).cents(),
        });
    }

    Ok(RefundPlan {
        items,
        items_subtotal,
        cart_discount_refund,
        tax_refund,
        total_amount,
        status_after: TransactionStatus::derive(prior_total + total_amount, refundable),
    })
}

/// Computes the inventory restorations for cancelling `transaction`.
///
/// Cancellation has no partial mode: every line's *remaining* quantity
/// (sold minus already refunded) goes back to stock in one pass. Lines
/// already fully refunded are skipped - their units went back when the
/// refund was processed.
pub fn plan_cancellation(transaction: &Transaction) -> CoreResult<Vec<StockRestoration>> {
    if !transaction.status.can_cancel() {
        return Err(CoreError::InvalidStatus {
            transaction_id: transaction.transaction_id.clone(),
            status: transaction.status,
            operation: "cancel",
        });
    }

    let already = refunded_quantities(&transaction.refunds);

    let mut restorations = Vec::new();
    for item in &transaction.items {
        let remaining = item.quantity - already.get(&item.item_index).copied().unwrap_or(0);
        if remaining > 0 {
            restorations.push(StockRestoration {
                key: item.stock_key(),
                quantity: remaining,
            });
        }
    }

    Ok(restorations)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentMethod, RefundStatus, TransactionItem};
    use chrono::Utc;

    fn line(
        index: usize,
        quantity: i64,
        unit_price_cents: i64,
        discounted_price_cents: Option<i64>,
    ) -> TransactionItem {
        TransactionItem {
            item_index: index,
            item_id: format!("line-{index}"),
            stock_id: format!("stk-{index}"),
            color: "black".into(),
            size: "M".into(),
            quantity,
            unit_price_cents,
            original_price_cents: unit_price_cents,
            discounted_price_cents,
        }
    }

    fn transaction(
        items: Vec<TransactionItem>,
        discount_cents: i64,
        tax_cents: i64,
    ) -> Transaction {
        let subtotal_cents: i64 = items
            .iter()
            .map(|i| i.unit_price_cents * i.quantity)
            .sum();
        let total_cents = subtotal_cents - discount_cents + tax_cents;
        Transaction {
            transaction_id: "txn-1".into(),
            items,
            subtotal_cents,
            tax_cents,
            discount_cents,
            total_cents,
            amount_paid_cents: total_cents,
            change_cents: 0,
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

    fn refund_record(transaction_id: &str, items: Vec<RefundItem>, total_amount_cents: i64) -> Refund {
        Refund {
            refund_id: "ref-prior".into(),
            transaction_id: transaction_id.into(),
            items,
            items_subtotal_cents: total_amount_cents,
            cart_discount_refund_cents: 0,
            tax_refund_cents: 0,
            total_amount_cents,
            status: RefundStatus::Completed,
            reason: None,
            refunded_by: None,
            created_at: Utc::now(),
        }
    }

    fn request_of(tx: &Transaction, lines: &[(usize, i64)]) -> RefundRequest {
        lines
            .iter()
            .map(|&(index, qty)| (LineKey::new(tx.items[index].item_id.clone(), index), qty))
            .collect()
    }

    /// Scenario: one line, qty 10 at 100, no discount/tax. Refund 4 → 400
    /// and partially_refunded; refund 6 more → 600 and refunded.
    #[test]
    fn test_simple_partial_then_full_refund() {
        let mut tx = transaction(vec![line(0, 10, 10000, None)], 0, 0);

        let plan = plan_refund(&tx, &request_of(&tx, &[(0, 4)])).unwrap();
        assert_eq!(plan.total_amount.cents(), 40000);
        assert_eq!(plan.status_after, TransactionStatus::PartiallyRefunded);

        tx.refunds.push(refund_record("txn-1", plan.items.clone(), 40000));
        tx.status = plan.status_after;

        let plan2 = plan_refund(&tx, &request_of(&tx, &[(0, 6)])).unwrap();
        assert_eq!(plan2.total_amount.cents(), 60000);
        assert_eq!(plan2.status_after, TransactionStatus::Refunded);
    }

    /// Scenario: subtotal 1000.00, cart discount 100.00, tax 50.00, one
    /// line qty 10 actually paid 90.00/unit. Refund 5 → items 450.00,
    /// discount share 45.00, payout 405.00, tax share 22.50 recorded only.
    #[test]
    fn test_proportional_discount_and_tax_allocation() {
        let tx = transaction(vec![line(0, 10, 10000, Some(9000))], 10000, 5000);
        assert_eq!(tx.subtotal_cents, 100000);
        assert_eq!(tx.refundable_cents().cents(), 90000);

        let plan = plan_refund(&tx, &request_of(&tx, &[(0, 5)])).unwrap();
        assert_eq!(plan.items_subtotal.cents(), 45000);
        assert_eq!(plan.cart_discount_refund.cents(), 4500);
        assert_eq!(plan.total_amount.cents(), 40500);
        // (45000 − 4500) / 90000 × 5000 = 2250
        assert_eq!(plan.tax_refund.cents(), 2250);
    }

    /// Scenario: refund 11 on a line of 10 is rejected before any write.
    #[test]
    fn test_over_refund_quantity_rejected() {
        let tx = transaction(vec![line(0, 10, 10000, None)], 0, 0);
        let err = plan_refund(&tx, &request_of(&tx, &[(0, 11)])).unwrap_err();
        assert!(matches!(
            err,
            CoreError::RefundExceedsRemaining {
                item_index: 0,
                requested: 11,
                remaining: 10,
            }
        ));
    }

    #[test]
    fn test_refund_accounts_for_prior_refunds() {
        let mut tx = transaction(vec![line(0, 10, 10000, None)], 0, 0);
        tx.refunds.push(refund_record(
            "txn-1",
            vec![RefundItem {
                item_index: 0,
                stock_id: "stk-0".into(),
                color: "black".into(),
                size: "M".into(),
                quantity: 7,
            }],
            70000,
        ));
        tx.status = TransactionStatus::PartiallyRefunded;

        let err = plan_refund(&tx, &request_of(&tx, &[(0, 4)])).unwrap_err();
        assert!(matches!(
            err,
            CoreError::RefundExceedsRemaining { remaining: 3, .. }
        ));

        assert!(plan_refund(&tx, &request_of(&tx, &[(0, 3)])).is_ok());
    }

    #[test]
    fn test_zero_quantity_lines_skipped_and_empty_rejected() {
        let tx = transaction(vec![line(0, 10, 10000, None), line(1, 2, 5000, None)], 0, 0);

        // Zero line skipped; the other still refunds.
        let plan = plan_refund(&tx, &request_of(&tx, &[(0, 0), (1, 1)])).unwrap();
        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].item_index, 1);

        // All-zero request → nothing to refund.
        let err = plan_refund(&tx, &request_of(&tx, &[(0, 0)])).unwrap_err();
        assert!(matches!(err, CoreError::NothingToRefund));

        let err = plan_refund(&tx, &RefundRequest::new()).unwrap_err();
        assert!(matches!(err, CoreError::NothingToRefund));
    }

    #[test]
    fn test_negative_quantity_rejected() {
        let tx = transaction(vec![line(0, 10, 10000, None)], 0, 0);
        let err = plan_refund(&tx, &request_of(&tx, &[(0, -1)])).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_mismatched_line_key_rejected() {
        let tx = transaction(vec![line(0, 10, 10000, None)], 0, 0);
        let mut request = RefundRequest::new();
        request.insert(LineKey::new("some-other-line", 0), 1);

        let err = plan_refund(&tx, &request).unwrap_err();
        assert!(matches!(err, CoreError::LineNotFound { item_index: 0, .. }));
    }

    #[test]
    fn test_refund_rejected_on_terminal_status() {
        let mut tx = transaction(vec![line(0, 10, 10000, None)], 0, 0);
        tx.status = TransactionStatus::Cancelled;

        let err = plan_refund(&tx, &request_of(&tx, &[(0, 1)])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidStatus { .. }));
    }

    /// Refund uses what was actually paid, never the original list price.
    #[test]
    fn test_refund_uses_actual_price_paid() {
        let mut item = line(0, 4, 10000, Some(7500));
        item.original_price_cents = 12000;
        let tx = transaction(vec![item], 0, 0);

        let plan = plan_refund(&tx, &request_of(&tx, &[(0, 2)])).unwrap();
        assert_eq!(plan.items_subtotal.cents(), 15000);
    }

    /// Rounding stability: refunding every line one call at a time lands
    /// within one cent of refunding everything in a single call.
    #[test]
    fn test_rounding_stability_across_partial_refunds() {
        let items = vec![
            line(0, 3, 3333, None),
            line(1, 1, 9999, None),
            line(2, 7, 1001, None),
        ];
        let tx_single = transaction(items.clone(), 1777, 911);

        let all_lines = request_of(&tx_single, &[(0, 3), (1, 1), (2, 7)]);
        let single = plan_refund(&tx_single, &all_lines).unwrap();

        let mut tx_stepped = transaction(items, 1777, 911);
        let mut stepped_total = Money::zero();
        for index in 0..3 {
            let qty = tx_stepped.items[index].quantity;
            let plan = plan_refund(&tx_stepped, &request_of(&tx_stepped, &[(index, qty)])).unwrap();
            stepped_total += plan.total_amount;
            tx_stepped.refunds.push(Refund {
                refund_id: format!("ref-{index}"),
                transaction_id: "txn-1".into(),
                items: plan.items,
                items_subtotal_cents: plan.items_subtotal.cents(),
                cart_discount_refund_cents: plan.cart_discount_refund.cents(),
                tax_refund_cents: plan.tax_refund.cents(),
                total_amount_cents: plan.total_amount.cents(),
                status: RefundStatus::Completed,
                reason: None,
                refunded_by: None,
                created_at: Utc::now(),
            });
            tx_stepped.status = plan.status_after;
        }

        let diff = (stepped_total.cents() - single.total_amount.cents()).abs();
        assert!(diff <= 1, "stepped refunds drifted {diff} cents");
    }

    /// Cumulative payouts can never pass subtotal − discount, whatever the
    /// sequence of individually-valid requests.
    #[test]
    fn test_grand_total_invariant_holds() {
        let mut tx = transaction(vec![line(0, 10, 10000, None)], 20000, 0);
        let refundable = tx.refundable_cents().cents();

        let mut refunded = 0i64;
        for step in 0..10 {
            let plan = match plan_refund(&tx, &request_of(&tx, &[(0, 1)])) {
                Ok(plan) => plan,
                Err(_) => break,
            };
            refunded += plan.total_amount.cents();
            assert!(refunded <= refundable);
            tx.refunds.push(Refund {
                refund_id: format!("ref-{step}"),
                transaction_id: "txn-1".into(),
                items: plan.items,
                items_subtotal_cents: plan.items_subtotal.cents(),
                cart_discount_refund_cents: plan.cart_discount_refund.cents(),
                tax_refund_cents: plan.tax_refund.cents(),
                total_amount_cents: plan.total_amount.cents(),
                status: RefundStatus::Completed,
                reason: None,
                refunded_by: None,
                created_at: Utc::now(),
            });
            tx.status = plan.status_after;
        }
        assert!(refunded <= refundable);
    }

    /// Scenario: 3 of 10 units refunded, then cancel → exactly 7 restored.
    #[test]
    fn test_cancellation_restores_only_remaining() {
        let mut tx = transaction(vec![line(0, 10, 10000, None)], 0, 0);
        tx.refunds.push(refund_record(
            "txn-1",
            vec![RefundItem {
                item_index: 0,
                stock_id: "stk-0".into(),
                color: "black".into(),
                size: "M".into(),
                quantity: 3,
            }],
            30000,
        ));
        tx.status = TransactionStatus::PartiallyRefunded;

        let restorations = plan_cancellation(&tx).unwrap();
        assert_eq!(restorations.len(), 1);
        assert_eq!(restorations[0].quantity, 7);

        // Restored + previously refunded == original line quantity.
        assert_eq!(restorations[0].quantity + 3, tx.items[0].quantity);
    }

    #[test]
    fn test_cancellation_skips_fully_refunded_lines() {
        let mut tx = transaction(vec![line(0, 2, 10000, None), line(1, 5, 4000, None)], 0, 0);
        tx.refunds.push(refund_record(
            "txn-1",
            vec![RefundItem {
                item_index: 0,
                stock_id: "stk-0".into(),
                color: "black".into(),
                size: "M".into(),
                quantity: 2,
            }],
            20000,
        ));
        tx.status = TransactionStatus::PartiallyRefunded;

        let restorations = plan_cancellation(&tx).unwrap();
        assert_eq!(restorations.len(), 1);
        assert_eq!(restorations[0].key.stock_id, "stk-1");
        assert_eq!(restorations[0].quantity, 5);
    }

    #[test]
    fn test_cancellation_rejected_on_terminal_status() {
        let mut tx = transaction(vec![line(0, 1, 1000, None)], 0, 0);
        tx.status = TransactionStatus::Refunded;
        assert!(matches!(
            plan_cancellation(&tx).unwrap_err(),
            CoreError::InvalidStatus { .. }
        ));
    }
}
