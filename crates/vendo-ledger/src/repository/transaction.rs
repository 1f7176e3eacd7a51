//! # Transaction Ledger Repository
//!
//! Persistence for the append-only sales ledger.
//!
//! ## Write Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                  Ledger Write Discipline                            │
//! │                                                                     │
//! │  CHECKOUT                                                           │
//! │    insert_transaction() - transaction + frozen items in one SQL     │
//! │    transaction; all-or-nothing                                      │
//! │                                                                     │
//! │  REFUND                                                             │
//! │    append_refund() - refund + refund items + status update in one   │
//! │    SQL transaction, guarded by                                      │
//! │        WHERE version = <version read during planning>               │
//! │    Zero rows affected means someone wrote in between: the whole     │
//! │    write rolls back and the caller re-plans against fresh state.    │
//! │    A blind last-write-wins update of the refund history could       │
//! │    silently break the over-refund invariant; the version guard      │
//! │    makes that race lose instead.                                    │
//! │                                                                     │
//! │  CANCELLATION                                                       │
//! │    mark_cancelled() - same version guard, terminal status stamp     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use vendo_core::{
    PaymentMethod, Refund, RefundItem, RefundStatus, Transaction, TransactionItem,
    TransactionStatus,
};

// =============================================================================
// Filters
// =============================================================================

/// Default page size for ledger listings.
const DEFAULT_LIST_LIMIT: i64 = 50;

/// Filters for listing ledger transactions.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

// =============================================================================
// Row Types
// =============================================================================
// Runtime-checked queries decode into these, then convert into domain
// types; enum columns are TEXT and parsed explicitly so a corrupt row is
// an error, not a panic.

#[derive(sqlx::FromRow)]
struct TransactionRow {
    transaction_id: String,
    subtotal_cents: i64,
    tax_cents: i64,
    discount_cents: i64,
    total_cents: i64,
    amount_paid_cents: i64,
    change_cents: i64,
    payment_method: String,
    status: String,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    cancelled_by: Option<String>,
    created_at: DateTime<Utc>,
    version: i64,
}

#[derive(sqlx::FromRow)]
struct TransactionItemRow {
    item_index: i64,
    item_id: String,
    stock_id: String,
    color: String,
    size: String,
    quantity: i64,
    unit_price_cents: i64,
    original_price_cents: i64,
    discounted_price_cents: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct RefundRow {
    refund_id: String,
    transaction_id: String,
    items_subtotal_cents: i64,
    cart_discount_refund_cents: i64,
    tax_refund_cents: i64,
    total_amount_cents: i64,
    status: String,
    reason: Option<String>,
    refunded_by: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RefundItemRow {
    item_index: i64,
    stock_id: String,
    color: String,
    size: String,
    quantity: i64,
}

impl TransactionRow {
    fn into_transaction(
        self,
        items: Vec<TransactionItem>,
        refunds: Vec<Refund>,
    ) -> LedgerResult<Transaction> {
        let payment_method: PaymentMethod =
            self.payment_method
                .parse()
                .map_err(|message| LedgerError::CorruptRow {
                    entity: "transaction",
                    id: self.transaction_id.clone(),
                    message,
                })?;
        let status: TransactionStatus =
            self.status
                .parse()
                .map_err(|message| LedgerError::CorruptRow {
                    entity: "transaction",
                    id: self.transaction_id.clone(),
                    message,
                })?;

        Ok(Transaction {
            transaction_id: self.transaction_id,
            items,
            subtotal_cents: self.subtotal_cents,
            tax_cents: self.tax_cents,
            discount_cents: self.discount_cents,
            total_cents: self.total_cents,
            amount_paid_cents: self.amount_paid_cents,
            change_cents: self.change_cents,
            payment_method,
            status,
            refunds,
            cancelled_at: self.cancelled_at,
            cancel_reason: self.cancel_reason,
            cancelled_by: self.cancelled_by,
            created_at: self.created_at,
            version: self.version,
        })
    }
}

impl RefundRow {
    fn into_refund(self, items: Vec<RefundItem>) -> LedgerResult<Refund> {
        let status: RefundStatus =
            self.status
                .parse()
                .map_err(|message| LedgerError::CorruptRow {
                    entity: "refund",
                    id: self.refund_id.clone(),
                    message,
                })?;
        Ok(Refund {
            refund_id: self.refund_id,
            transaction_id: self.transaction_id,
            items,
            items_subtotal_cents: self.items_subtotal_cents,
            cart_discount_refund_cents: self.cart_discount_refund_cents,
            tax_refund_cents: self.tax_refund_cents,
            total_amount_cents: self.total_amount_cents,
            status,
            reason: self.reason,
            refunded_by: self.refunded_by,
            created_at: self.created_at,
        })
    }
}

fn item_from_row(row: TransactionItemRow) -> TransactionItem {
    TransactionItem {
        item_index: row.item_index as usize,
        item_id: row.item_id,
        stock_id: row.stock_id,
        color: row.color,
        size: row.size,
        quantity: row.quantity,
        unit_price_cents: row.unit_price_cents,
        original_price_cents: row.original_price_cents,
        discounted_price_cents: row.discounted_price_cents,
    }
}

fn refund_item_from_row(row: RefundItemRow) -> RefundItem {
    RefundItem {
        item_index: row.item_index as usize,
        stock_id: row.stock_id,
        color: row.color,
        size: row.size,
        quantity: row.quantity,
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for ledger transactions and their refunds.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    /// Creates a new TransactionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Inserts a new transaction with its frozen item snapshot.
    ///
    /// Transaction row and item rows commit together or not at all.
    pub async fn insert_transaction(&self, transaction: &Transaction) -> LedgerResult<()> {
        debug!(
            transaction_id = %transaction.transaction_id,
            total_cents = transaction.total_cents,
            items = transaction.items.len(),
            "Inserting transaction"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                transaction_id,
                subtotal_cents, tax_cents, discount_cents, total_cents,
                amount_paid_cents, change_cents,
                payment_method, status,
                cancelled_at, cancel_reason, cancelled_by,
                created_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&transaction.transaction_id)
        .bind(transaction.subtotal_cents)
        .bind(transaction.tax_cents)
        .bind(transaction.discount_cents)
        .bind(transaction.total_cents)
        .bind(transaction.amount_paid_cents)
        .bind(transaction.change_cents)
        .bind(transaction.payment_method.as_str())
        .bind(transaction.status.as_str())
        .bind(transaction.cancelled_at)
        .bind(&transaction.cancel_reason)
        .bind(&transaction.cancelled_by)
        .bind(transaction.created_at)
        .bind(transaction.version)
        .execute(&mut *tx)
        .await?;

        for item in &transaction.items {
            sqlx::query(
                r#"
                INSERT INTO transaction_items (
                    transaction_id, item_index, item_id,
                    stock_id, color, size, quantity,
                    unit_price_cents, original_price_cents, discounted_price_cents
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&transaction.transaction_id)
            .bind(item.item_index as i64)
            .bind(&item.item_id)
            .bind(&item.stock_id)
            .bind(&item.color)
            .bind(&item.size)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.original_price_cents)
            .bind(item.discounted_price_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Loads a transaction with its frozen items and full refund history.
    pub async fn get_by_id(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>> {
        let row: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT
                transaction_id,
                subtotal_cents, tax_cents, discount_cents, total_cents,
                amount_paid_cents, change_cents,
                payment_method, status,
                cancelled_at, cancel_reason, cancelled_by,
                created_at, version
            FROM transactions
            WHERE transaction_id = ?
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = self.get_items(transaction_id).await?;
        let refunds = self.get_refunds(transaction_id).await?;

        Ok(Some(row.into_transaction(items, refunds)?))
    }

    /// Lists transactions matching `filter`, newest first.
    pub async fn list(&self, filter: &TransactionFilter) -> LedgerResult<Vec<Transaction>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT
                transaction_id,
                subtotal_cents, tax_cents, discount_cents, total_cents,
                amount_paid_cents, change_cents,
                payment_method, status,
                cancelled_at, cancel_reason, cancelled_by,
                created_at, version
            FROM transactions
            WHERE 1 = 1
            "#,
        );

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(method) = filter.payment_method {
            builder
                .push(" AND payment_method = ")
                .push_bind(method.as_str());
        }
        if let Some(after) = filter.created_after {
            builder.push(" AND created_at >= ").push_bind(after);
        }
        if let Some(before) = filter.created_before {
            builder.push(" AND created_at <= ").push_bind(before);
        }
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT));

        let rows: Vec<TransactionRow> = builder.build_query_as().fetch_all(&self.pool).await?;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in rows {
            let items = self.get_items(&row.transaction_id).await?;
            let refunds = self.get_refunds(&row.transaction_id).await?;
            transactions.push(row.into_transaction(items, refunds)?);
        }
        Ok(transactions)
    }

    /// Loads the frozen item snapshot, in item_index order.
    async fn get_items(&self, transaction_id: &str) -> LedgerResult<Vec<TransactionItem>> {
        let rows: Vec<TransactionItemRow> = sqlx::query_as(
            r#"
            SELECT
                item_index, item_id, stock_id, color, size, quantity,
                unit_price_cents, original_price_cents, discounted_price_cents
            FROM transaction_items
            WHERE transaction_id = ?
            ORDER BY item_index
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(item_from_row).collect())
    }

    /// Loads all refunds for a transaction, in submission order.
    pub async fn get_refunds(&self, transaction_id: &str) -> LedgerResult<Vec<Refund>> {
        let rows: Vec<RefundRow> = sqlx::query_as(
            r#"
            SELECT
                refund_id, transaction_id,
                items_subtotal_cents, cart_discount_refund_cents,
                tax_refund_cents, total_amount_cents,
                status, reason, refunded_by, created_at
            FROM refunds
            WHERE transaction_id = ?
            ORDER BY created_at, refund_id
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        let mut refunds = Vec::with_capacity(rows.len());
        for row in rows {
            let item_rows: Vec<RefundItemRow> = sqlx::query_as(
                r#"
                SELECT item_index, stock_id, color, size, quantity
                FROM refund_items
                WHERE refund_id = ?
                ORDER BY item_index
                "#,
            )
            .bind(&row.refund_id)
            .fetch_all(&self.pool)
            .await?;

            let items = item_rows.into_iter().map(refund_item_from_row).collect();
            refunds.push(row.into_refund(items)?);
        }
        Ok(refunds)
    }

    /// Appends a refund and moves the transaction to `new_status`, guarded
    /// by the version read during planning.
    ///
    /// Returns `Conflict` (and writes nothing) if the transaction's
    /// version moved in between - the caller must re-read, re-validate and
    /// re-plan rather than reapply the stale plan.
    pub async fn append_refund(
        &self,
        transaction_id: &str,
        expected_version: i64,
        refund: &Refund,
        new_status: TransactionStatus,
    ) -> LedgerResult<()> {
        debug!(
            transaction_id = %transaction_id,
            refund_id = %refund.refund_id,
            total_amount_cents = refund.total_amount_cents,
            expected_version,
            "Appending refund"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO refunds (
                refund_id, transaction_id,
                items_subtotal_cents, cart_discount_refund_cents,
                tax_refund_cents, total_amount_cents,
                status, reason, refunded_by, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&refund.refund_id)
        .bind(transaction_id)
        .bind(refund.items_subtotal_cents)
        .bind(refund.cart_discount_refund_cents)
        .bind(refund.tax_refund_cents)
        .bind(refund.total_amount_cents)
        .bind(refund.status.as_str())
        .bind(&refund.reason)
        .bind(&refund.refunded_by)
        .bind(refund.created_at)
        .execute(&mut *tx)
        .await?;

        for item in &refund.items {
            sqlx::query(
                r#"
                INSERT INTO refund_items (refund_id, item_index, stock_id, color, size, quantity)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&refund.refund_id)
            .bind(item.item_index as i64)
            .bind(&item.stock_id)
            .bind(&item.color)
            .bind(&item.size)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?, version = version + 1
            WHERE transaction_id = ? AND version = ?
            "#,
        )
        .bind(new_status.as_str())
        .bind(transaction_id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(LedgerError::conflict("transaction", transaction_id));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Stamps a transaction cancelled, guarded by the version read during
    /// planning. Terminal states are excluded in the predicate, so a
    /// racing cancel/refund also surfaces as a conflict.
    pub async fn mark_cancelled(
        &self,
        transaction_id: &str,
        expected_version: i64,
        cancelled_at: DateTime<Utc>,
        reason: Option<&str>,
        cancelled_by: Option<&str>,
    ) -> LedgerResult<()> {
        debug!(transaction_id = %transaction_id, expected_version, "Marking cancelled");

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'cancelled',
                cancelled_at = ?,
                cancel_reason = ?,
                cancelled_by = ?,
                version = version + 1
            WHERE transaction_id = ?
              AND version = ?
              AND status NOT IN ('refunded', 'cancelled')
            "#,
        )
        .bind(cancelled_at)
        .bind(reason)
        .bind(cancelled_by)
        .bind(transaction_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::conflict("transaction", transaction_id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use vendo_core::{freeze_transaction, Cart, CheckoutRequest, StockKey, StockSnapshot};

    async fn setup() -> TransactionRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.transactions()
    }

    fn sample_transaction(id: &str) -> Transaction {
        let key = StockKey::new("stk-1", "black", "M");
        let mut snapshot = StockSnapshot::new();
        snapshot.set(key.clone(), 100);
        let mut cart = Cart::new();
        cart.add_item(&snapshot, "line-1", key, 10, 10_000).unwrap();

        freeze_transaction(
            &cart,
            &CheckoutRequest {
                transaction_id: id.into(),
                payment_method: PaymentMethod::Cash,
                amount_paid_cents: 100_000,
                cart_discount_cents: 10_000,
                tax_rate_bps: 500,
            },
        )
        .unwrap()
    }

    fn sample_refund(transaction_id: &str, quantity: i64, total_cents: i64) -> Refund {
        Refund {
            refund_id: format!("ref-{transaction_id}-{quantity}"),
            transaction_id: transaction_id.into(),
            items: vec![RefundItem {
                item_index: 0,
                stock_id: "stk-1".into(),
                color: "black".into(),
                size: "M".into(),
                quantity,
            }],
            items_subtotal_cents: quantity * 10_000,
            cart_discount_refund_cents: quantity * 1_000,
            tax_refund_cents: quantity * 450,
            total_amount_cents: total_cents,
            status: RefundStatus::Completed,
            reason: None,
            refunded_by: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let repo = setup().await;
        let tx = sample_transaction("txn-1");
        repo.insert_transaction(&tx).await.unwrap();

        let loaded = repo.get_by_id("txn-1").await.unwrap().unwrap();
        assert_eq!(loaded.transaction_id, "txn-1");
        assert_eq!(loaded.subtotal_cents, 100_000);
        assert_eq!(loaded.tax_cents, 4_500);
        assert_eq!(loaded.status, TransactionStatus::Completed);
        assert_eq!(loaded.version, 0);
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].item_index, 0);
        assert_eq!(loaded.items[0].quantity, 10);
        assert!(loaded.refunds.is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let repo = setup().await;
        assert!(repo.get_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let repo = setup().await;
        let tx = sample_transaction("txn-1");
        repo.insert_transaction(&tx).await.unwrap();

        let err = repo.insert_transaction(&tx).await.unwrap_err();
        assert!(matches!(err, LedgerError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_append_refund_bumps_version_and_status() {
        let repo = setup().await;
        let tx = sample_transaction("txn-1");
        repo.insert_transaction(&tx).await.unwrap();

        let refund = sample_refund("txn-1", 4, 36_000);
        repo.append_refund("txn-1", 0, &refund, TransactionStatus::PartiallyRefunded)
            .await
            .unwrap();

        let loaded = repo.get_by_id("txn-1").await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.status, TransactionStatus::PartiallyRefunded);
        assert_eq!(loaded.refunds.len(), 1);
        assert_eq!(loaded.refunds[0].items[0].quantity, 4);
    }

    #[tokio::test]
    async fn test_append_refund_with_stale_version_writes_nothing() {
        let repo = setup().await;
        let tx = sample_transaction("txn-1");
        repo.insert_transaction(&tx).await.unwrap();

        let refund = sample_refund("txn-1", 4, 36_000);
        let err = repo
            .append_refund("txn-1", 7, &refund, TransactionStatus::PartiallyRefunded)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { .. }));

        // The whole write rolled back: no refund row, status untouched.
        let loaded = repo.get_by_id("txn-1").await.unwrap().unwrap();
        assert!(loaded.refunds.is_empty());
        assert_eq!(loaded.status, TransactionStatus::Completed);
        assert_eq!(loaded.version, 0);
    }

    #[tokio::test]
    async fn test_mark_cancelled_stamps_and_guards() {
        let repo = setup().await;
        let tx = sample_transaction("txn-1");
        repo.insert_transaction(&tx).await.unwrap();

        repo.mark_cancelled("txn-1", 0, Utc::now(), Some("customer changed mind"), Some("clerk-1"))
            .await
            .unwrap();

        let loaded = repo.get_by_id("txn-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TransactionStatus::Cancelled);
        assert!(loaded.cancelled_at.is_some());
        assert_eq!(loaded.cancel_reason.as_deref(), Some("customer changed mind"));
        assert_eq!(loaded.version, 1);

        // Terminal now; a second cancel loses the predicate.
        let err = repo
            .mark_cancelled("txn-1", 1, Utc::now(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let repo = setup().await;
        repo.insert_transaction(&sample_transaction("txn-1"))
            .await
            .unwrap();
        repo.insert_transaction(&sample_transaction("txn-2"))
            .await
            .unwrap();
        repo.mark_cancelled("txn-2", 0, Utc::now(), None, None)
            .await
            .unwrap();

        let completed = repo
            .list(&TransactionFilter {
                status: Some(TransactionStatus::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].transaction_id, "txn-1");

        let all = repo.list(&TransactionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
