//! # Stock Level Repository
//!
//! Per-variant stock counters keyed by (stock_id, color, size).
//!
//! ## Delta Writes Only
//! Every mutation is a bounded atomic delta executed inside SQLite:
//! ```text
//!   reduce:  UPDATE ... SET quantity = quantity - ? WHERE ... AND quantity >= ?
//!   restore: INSERT ... ON CONFLICT DO UPDATE SET quantity = quantity + ?
//! ```
//! There is no read-modify-write cycle anywhere, so concurrent reducers
//! cannot interleave into a negative count; the `quantity >= ?` predicate
//! (backed by the CHECK constraint) makes an overdraw lose atomically.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use vendo_core::{CoreError, StockKey, StockRestoration, StockSnapshot};

#[derive(sqlx::FromRow)]
struct StockRow {
    stock_id: String,
    color: String,
    size: String,
    quantity: i64,
}

/// Repository for per-variant stock levels.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Sets the absolute stock level for a variant (seeding / receiving).
    pub async fn set_stock(&self, key: &StockKey, quantity: i64) -> LedgerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_levels (stock_id, color, size, quantity)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (stock_id, color, size) DO UPDATE SET quantity = excluded.quantity
            "#,
        )
        .bind(&key.stock_id)
        .bind(&key.color)
        .bind(&key.size)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns the current stock level for a variant. Unknown variants
    /// read as zero.
    pub async fn check_stock(&self, key: &StockKey) -> LedgerResult<i64> {
        let quantity: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT quantity FROM stock_levels
            WHERE stock_id = ? AND color = ? AND size = ?
            "#,
        )
        .bind(&key.stock_id)
        .bind(&key.color)
        .bind(&key.size)
        .fetch_optional(&self.pool)
        .await?;

        Ok(quantity.map(|(q,)| q).unwrap_or(0))
    }

    /// Atomically reduces a variant's stock by `quantity`.
    ///
    /// Fails with `InsufficientStock` (carrying the current level) when
    /// the counter would go negative; the row is left untouched.
    pub async fn reduce_stock(&self, key: &StockKey, quantity: i64) -> LedgerResult<()> {
        debug!(stock_key = %key, quantity, "Reducing stock");

        let result = sqlx::query(
            r#"
            UPDATE stock_levels
            SET quantity = quantity - ?
            WHERE stock_id = ? AND color = ? AND size = ? AND quantity >= ?
            "#,
        )
        .bind(quantity)
        .bind(&key.stock_id)
        .bind(&key.color)
        .bind(&key.size)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let available = self.check_stock(key).await?;
            return Err(LedgerError::Core(CoreError::InsufficientStock {
                stock_key: key.to_string(),
                available,
                requested: quantity,
            }));
        }

        Ok(())
    }

    /// Atomically restores a variant's stock by `quantity`, creating the
    /// row if the variant has never been stocked.
    pub async fn restore_stock(&self, key: &StockKey, quantity: i64) -> LedgerResult<()> {
        debug!(stock_key = %key, quantity, "Restoring stock");

        sqlx::query(
            r#"
            INSERT INTO stock_levels (stock_id, color, size, quantity)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (stock_id, color, size) DO UPDATE SET quantity = quantity + excluded.quantity
            "#,
        )
        .bind(&key.stock_id)
        .bind(&key.color)
        .bind(&key.size)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Restores several variants in one SQL transaction. Used by
    /// cancellation, where partial restoration would desynchronize
    /// inventory from the ledger.
    pub async fn restore_multiple(&self, restorations: &[StockRestoration]) -> LedgerResult<()> {
        if restorations.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for restoration in restorations {
            sqlx::query(
                r#"
                INSERT INTO stock_levels (stock_id, color, size, quantity)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (stock_id, color, size) DO UPDATE SET quantity = quantity + excluded.quantity
                "#,
            )
            .bind(&restoration.key.stock_id)
            .bind(&restoration.key.color)
            .bind(&restoration.key.size)
            .bind(restoration.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(count = restorations.len(), "Restored stock batch");
        Ok(())
    }

    /// Reads all stock levels into an in-memory snapshot for cart-side
    /// availability checks.
    pub async fn snapshot(&self) -> LedgerResult<StockSnapshot> {
        let rows: Vec<StockRow> = sqlx::query_as(
            r#"
            SELECT stock_id, color, size, quantity FROM stock_levels
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    StockKey {
                        stock_id: row.stock_id,
                        color: row.color,
                        size: row.size,
                    },
                    row.quantity,
                )
            })
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
