//! # Ledger Service
//!
//! Orchestrates the transaction ledger: recording checkouts, processing
//! refunds and cancellations, and restoring inventory afterwards.
//!
//! ## Concurrency Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                 Refund / Cancel Concurrency                         │
//! │                                                                     │
//! │  Layer 1: single-flight guard (in-process)                          │
//! │    A second refund/cancel for the same transaction_id is rejected   │
//! │    immediately with OperationInFlight while the first is running.   │
//! │                                                                     │
//! │  Layer 2: version CAS (in the store)                                │
//! │    Every write carries the version read during planning. If         │
//! │    another writer got there first the write affects zero rows, the  │
//! │    service re-reads and re-plans, up to MAX_REFUND_RETRIES times.   │
//! │    Validation runs against the fresh history on every attempt, so   │
//! │    a retry that would now over-refund fails validation instead of   │
//! │    writing.                                                         │
//! │                                                                     │
//! │  Inventory restoration happens strictly AFTER the ledger commit     │
//! │  and is best-effort: the ledger is the source of truth, a missed    │
//! │  restoration is a logged discrepancy, not a corrupted ledger.       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use vendo_core::{
    plan_cancellation, plan_refund, validate_transaction_draft, Refund, RefundRequest,
    RefundStatus, StockRestoration, Transaction,
};

use crate::error::{LedgerError, LedgerResult};
use crate::pool::Database;
use crate::repository::transaction::TransactionFilter;

// =============================================================================
// Constants
// =============================================================================

/// How many times a refund/cancel write is re-planned after losing a
/// version race before giving up.
const MAX_WRITE_RETRIES: u32 = 3;

// =============================================================================
// Single-Flight Guard
// =============================================================================

/// Removes the transaction id from the in-flight set when the operation
/// finishes, on every exit path.
struct FlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    transaction_id: String,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.transaction_id);
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// High-level API over the ledger and inventory stores.
#[derive(Clone)]
pub struct LedgerService {
    db: Database,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl LedgerService {
    /// Creates a new ledger service over an initialized database.
    pub fn new(db: Database) -> Self {
        LedgerService {
            db,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Returns the underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    // -------------------------------------------------------------------------
    // Recording
    // -------------------------------------------------------------------------

    /// Validates and records a frozen transaction in the ledger.
    pub async fn record_transaction(&self, transaction: &Transaction) -> LedgerResult<()> {
        validate_transaction_draft(transaction).map_err(vendo_core::CoreError::from)?;
        self.db.transactions().insert_transaction(transaction).await?;

        info!(
            transaction_id = %transaction.transaction_id,
            total_cents = transaction.total_cents,
            "Transaction recorded"
        );
        Ok(())
    }

    /// Loads a transaction with items and refund history.
    pub async fn get_transaction(&self, transaction_id: &str) -> LedgerResult<Transaction> {
        self.db
            .transactions()
            .get_by_id(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("transaction", transaction_id))
    }

    /// Lists transactions matching the filter, newest first.
    pub async fn get_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> LedgerResult<Vec<Transaction>> {
        self.db.transactions().list(filter).await
    }

    /// Lists all refunds recorded against a transaction.
    pub async fn get_transaction_refunds(&self, transaction_id: &str) -> LedgerResult<Vec<Refund>> {
        self.db.transactions().get_refunds(transaction_id).await
    }

    // -------------------------------------------------------------------------
    // Refunds
    // -------------------------------------------------------------------------

    /// Processes a refund request against a transaction.
    ///
    /// Validation, money math and the resulting status all come from the
    /// planner; this method supplies fresh state, writes the plan with a
    /// version check, and restores inventory after the commit.
    pub async fn process_refund(
        &self,
        transaction_id: &str,
        request: &RefundRequest,
        reason: Option<String>,
        refunded_by: Option<String>,
    ) -> LedgerResult<Refund> {
        let _guard = self.acquire_flight(transaction_id)?;

        let mut attempt = 0;
        let refund = loop {
            attempt += 1;

            let transaction = self.get_transaction(transaction_id).await?;
            let plan = plan_refund(&transaction, request).map_err(LedgerError::Core)?;

            let refund = Refund {
                refund_id: Uuid::new_v4().to_string(),
                transaction_id: transaction_id.to_string(),
                items: plan.items.clone(),
                items_subtotal_cents: plan.items_subtotal.cents(),
                cart_discount_refund_cents: plan.cart_discount_refund.cents(),
                tax_refund_cents: plan.tax_refund.cents(),
                total_amount_cents: plan.total_amount.cents(),
                status: RefundStatus::Completed,
                reason: reason.clone(),
                refunded_by: refunded_by.clone(),
                created_at: Utc::now(),
            };

            match self
                .db
                .transactions()
                .append_refund(transaction_id, transaction.version, &refund, plan.status_after)
                .await
            {
                Ok(()) => break refund,
                Err(LedgerError::Conflict { .. }) if attempt < MAX_WRITE_RETRIES => {
                    warn!(
                        transaction_id = %transaction_id,
                        attempt,
                        "Refund lost a version race, re-planning"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            transaction_id = %transaction_id,
            refund_id = %refund.refund_id,
            total_amount_cents = refund.total_amount_cents,
            "Refund processed"
        );

        // Ledger is committed; put the units back. A failure here is an
        // inventory discrepancy to reconcile, never a ledger rollback.
        for item in &refund.items {
            let key = vendo_core::StockKey::new(&item.stock_id, &item.color, &item.size);
            if let Err(e) = self.db.stock().restore_stock(&key, item.quantity).await {
                warn!(
                    stock_key = %key,
                    quantity = item.quantity,
                    error = %e,
                    "Failed to restore stock after refund"
                );
            }
        }

        Ok(refund)
    }

    // -------------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------------

    /// Cancels a transaction, restoring every unit not already refunded.
    ///
    /// Returns the restorations that were applied.
    pub async fn cancel_transaction(
        &self,
        transaction_id: &str,
        reason: Option<String>,
        cancelled_by: Option<String>,
    ) -> LedgerResult<Vec<StockRestoration>> {
        let _guard = self.acquire_flight(transaction_id)?;

        let mut attempt = 0;
        let restorations = loop {
            attempt += 1;

            let transaction = self.get_transaction(transaction_id).await?;
            let restorations = plan_cancellation(&transaction).map_err(LedgerError::Core)?;

            match self
                .db
                .transactions()
                .mark_cancelled(
                    transaction_id,
                    transaction.version,
                    Utc::now(),
                    reason.as_deref(),
                    cancelled_by.as_deref(),
                )
                .await
            {
                Ok(()) => break restorations,
                Err(LedgerError::Conflict { .. }) if attempt < MAX_WRITE_RETRIES => {
                    warn!(
                        transaction_id = %transaction_id,
                        attempt,
                        "Cancellation lost a version race, re-planning"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            transaction_id = %transaction_id,
            lines = restorations.len(),
            "Transaction cancelled"
        );

        if let Err(e) = self.db.stock().restore_multiple(&restorations).await {
            warn!(
                transaction_id = %transaction_id,
                error = %e,
                "Failed to restore stock after cancellation"
            );
        }

        Ok(restorations)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Claims the single-flight slot for a transaction, or rejects if a
    /// refund/cancel for it is already running.
    fn acquire_flight(&self, transaction_id: &str) -> LedgerResult<FlightGuard> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| LedgerError::Internal("in-flight guard poisoned".to_string()))?;

        if !set.insert(transaction_id.to_string()) {
            return Err(LedgerError::OperationInFlight {
                transaction_id: transaction_id.to_string(),
            });
        }

        Ok(FlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            transaction_id: transaction_id.to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use std::collections::BTreeMap;
    use vendo_core::{
        freeze_transaction, Cart, CheckoutRequest, CoreError, LineKey, PaymentMethod, StockKey,
        StockSnapshot, TransactionStatus,
    };

    fn stock_key() -> StockKey {
        StockKey::new("stk-1", "black", "M")
    }

    /// Seeds stock at 50, sells 10 units of a 100.00 item with a 100.00
    /// cart discount and 5% tax, and applies the sale's stock reduction.
    ///
    /// Resulting ledger row: subtotal 1000.00, discount 100.00,
    /// tax 45.00, refundable 900.00. Stock left: 40.
    async fn service_with_sale() -> LedgerService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = LedgerService::new(db);
        let key = stock_key();
        service.database().stock().set_stock(&key, 50).await.unwrap();

        let mut snapshot = StockSnapshot::new();
        snapshot.set(key.clone(), 50);
        let mut cart = Cart::new();
        cart.add_item(&snapshot, "line-1", key.clone(), 10, 10_000)
            .unwrap();
        service
            .database()
            .stock()
            .reduce_stock(&key, 10)
            .await
            .unwrap();

        let tx = freeze_transaction(
            &cart,
            &CheckoutRequest {
                transaction_id: "txn-1".into(),
                payment_method: PaymentMethod::Cash,
                amount_paid_cents: 100_000,
                cart_discount_cents: 10_000,
                tax_rate_bps: 500,
            },
        )
        .unwrap();
        service.record_transaction(&tx).await.unwrap();
        service
    }

    fn refund_of(quantity: i64) -> RefundRequest {
        let mut request = BTreeMap::new();
        request.insert(LineKey::new("line-1", 0), quantity);
        request
    }

    #[tokio::test]
    async fn test_partial_then_full_refund_drives_status() {
        let service = service_with_sale().await;

        let first = service
            .process_refund("txn-1", &refund_of(4), None, None)
            .await
            .unwrap();
        assert_eq!(first.items_subtotal_cents, 40_000);
        assert_eq!(first.cart_discount_refund_cents, 4_000);
        assert_eq!(first.total_amount_cents, 36_000);

        let tx = service.get_transaction("txn-1").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::PartiallyRefunded);

        let second = service
            .process_refund("txn-1", &refund_of(6), None, None)
            .await
            .unwrap();
        assert_eq!(second.total_amount_cents, 54_000);

        let tx = service.get_transaction("txn-1").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Refunded);
        assert_eq!(tx.refunded_total().cents(), 90_000);
        assert_eq!(tx.version, 2);
    }

    #[tokio::test]
    async fn test_refund_allocates_discount_and_tax_proportionally() {
        let service = service_with_sale().await;

        // Half the subtotal refunded: half the discount, half the tax.
        let refund = service
            .process_refund("txn-1", &refund_of(5), None, None)
            .await
            .unwrap();

        assert_eq!(refund.items_subtotal_cents, 50_000);
        assert_eq!(refund.cart_discount_refund_cents, 5_000);
        assert_eq!(refund.total_amount_cents, 45_000);
        assert_eq!(refund.tax_refund_cents, 2_250);
    }

    #[tokio::test]
    async fn test_refund_restores_stock() {
        let service = service_with_sale().await;
        service
            .process_refund("txn-1", &refund_of(4), None, None)
            .await
            .unwrap();

        let level = service
            .database()
            .stock()
            .check_stock(&stock_key())
            .await
            .unwrap();
        assert_eq!(level, 44);
    }

    #[tokio::test]
    async fn test_over_refund_rejected_without_side_effects() {
        let service = service_with_sale().await;

        let err = service
            .process_refund("txn-1", &refund_of(11), None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::RefundExceedsRemaining { .. })
        ));

        let tx = service.get_transaction("txn-1").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.refunds.is_empty());

        let level = service
            .database()
            .stock()
            .check_stock(&stock_key())
            .await
            .unwrap();
        assert_eq!(level, 40);
    }

    #[tokio::test]
    async fn test_cancel_restores_only_unrefunded_units() {
        let service = service_with_sale().await;

        // 3 units refunded: those went back to stock already.
        service
            .process_refund("txn-1", &refund_of(3), None, None)
            .await
            .unwrap();

        let restorations = service
            .cancel_transaction("txn-1", Some("wrong size".into()), Some("clerk-1".into()))
            .await
            .unwrap();
        assert_eq!(restorations.len(), 1);
        assert_eq!(restorations[0].quantity, 7);

        let tx = service.get_transaction("txn-1").await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Cancelled);
        assert!(tx.cancelled_at.is_some());
        assert_eq!(tx.cancel_reason.as_deref(), Some("wrong size"));

        // Everything is back: 40 + 3 (refund) + 7 (cancel) = 50.
        let level = service
            .database()
            .stock()
            .check_stock(&stock_key())
            .await
            .unwrap();
        assert_eq!(level, 50);
    }

    #[tokio::test]
    async fn test_cancel_rejected_after_full_refund() {
        let service = service_with_sale().await;
        service
            .process_refund("txn-1", &refund_of(10), None, None)
            .await
            .unwrap();

        let err = service
            .cancel_transaction("txn-1", None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::InvalidStatus { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_full_refunds_one_wins() {
        let service = service_with_sale().await;

        // Requests must outlive the joined futures that borrow them.
        let first_request = refund_of(10);
        let second_request = refund_of(10);
        let (a, b) = tokio::join!(
            service.process_refund("txn-1", &first_request, None, None),
            service.process_refund("txn-1", &second_request, None, None),
        );

        // Whichever layer catches the race (single-flight guard or
        // re-validation after the version check), exactly one commits.
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);

        let tx = service.get_transaction("txn-1").await.unwrap();
        assert_eq!(tx.refunds.len(), 1);
        assert_eq!(tx.status, TransactionStatus::Refunded);
        assert_eq!(tx.refunded_total().cents(), 90_000);
    }

    #[tokio::test]
    async fn test_refund_unknown_transaction() {
        let service = service_with_sale().await;
        let err = service
            .process_refund("txn-unknown", &refund_of(1), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_record_rejects_tampered_totals() {
        let service = service_with_sale().await;
        let mut tx = service.get_transaction("txn-1").await.unwrap();
        tx.transaction_id = "txn-2".into();
        tx.total_cents += 1;

        let err = service.record_transaction(&tx).await.unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::Validation(_))));
    }
}
