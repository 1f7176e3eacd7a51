//! # Reservation Worker
//!
//! Applies cart-side stock reservations to the stock_levels table.
//!
//! ## Reservation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reservation Worker Flow                              │
//! │                                                                         │
//! │  Cart edit (sync, instant)                                              │
//! │       │                                                                 │
//! │       │ StockOp { Reduce | Restore, key, quantity }                     │
//! │       ▼                                                                 │
//! │  ReservationHandle.enqueue()  ──mpsc──►  ReservationWorker              │
//! │                                              │                          │
//! │                                              │ buffers ops, then        │
//! │                                              │ on tick / Flush:         │
//! │                                              ▼                          │
//! │                                  drain(): apply each op as an           │
//! │                                  atomic delta against stock_levels,     │
//! │                                  concurrently, one task per op          │
//! │                                                                         │
//! │  FAILURE ISOLATION:                                                     │
//! │  a failed op is logged and dropped; it never fails the batch and        │
//! │  never blocks the cart. The cart already re-checks availability on      │
//! │  every edit, so a dropped reduction self-corrects on the next           │
//! │  snapshot refresh.                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use vendo_core::StockOp;

use crate::error::{LedgerError, LedgerResult};
use crate::repository::stock::StockRepository;

// =============================================================================
// Constants
// =============================================================================

/// Channel capacity for enqueued stock operations.
const QUEUE_CAPACITY: usize = 256;

/// Default interval between automatic drains.
const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// Messages
// =============================================================================

enum ReservationMessage {
    /// Buffer a stock operation for the next drain.
    Apply(StockOp),

    /// Drain immediately and signal completion. Checkout uses this to
    /// make sure the cart's reductions have landed before freezing.
    Flush(oneshot::Sender<()>),

    /// Drain remaining operations and stop.
    Shutdown,
}

// =============================================================================
// Worker
// =============================================================================

/// Background worker that applies queued stock operations.
pub struct ReservationWorker {
    stock: StockRepository,
    rx: mpsc::Receiver<ReservationMessage>,
    pending: Vec<StockOp>,
    drain_interval: Duration,
}

/// Handle for enqueueing stock operations to the worker.
#[derive(Clone)]
pub struct ReservationHandle {
    tx: mpsc::Sender<ReservationMessage>,
}

impl ReservationHandle {
    /// Enqueues a stock operation for asynchronous application.
    pub async fn enqueue(&self, op: StockOp) -> LedgerResult<()> {
        self.tx
            .send(ReservationMessage::Apply(op))
            .await
            .map_err(|_| LedgerError::Internal("reservation queue closed".to_string()))
    }

    /// Drains the queue and waits until every buffered operation has been
    /// attempted.
    pub async fn flush(&self) -> LedgerResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(ReservationMessage::Flush(done_tx))
            .await
            .map_err(|_| LedgerError::Internal("reservation queue closed".to_string()))?;
        done_rx
            .await
            .map_err(|_| LedgerError::Internal("reservation worker stopped".to_string()))
    }

    /// Triggers graceful shutdown. Buffered operations are drained first.
    pub async fn shutdown(&self) -> LedgerResult<()> {
        self.tx
            .send(ReservationMessage::Shutdown)
            .await
            .map_err(|_| LedgerError::Internal("reservation queue closed".to_string()))
    }
}

impl ReservationWorker {
    /// Creates a new worker and its handle.
    pub fn new(stock: StockRepository) -> (Self, ReservationHandle) {
        Self::with_interval(stock, DEFAULT_DRAIN_INTERVAL)
    }

    /// Creates a worker with a custom drain interval (tests use a short
    /// one).
    pub fn with_interval(
        stock: StockRepository,
        drain_interval: Duration,
    ) -> (Self, ReservationHandle) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        let worker = ReservationWorker {
            stock,
            rx,
            pending: Vec::new(),
            drain_interval,
        };

        (worker, ReservationHandle { tx })
    }

    /// Runs the worker loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Reservation worker starting");

        let mut interval = tokio::time::interval(self.drain_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.drain().await;
                }

                msg = self.rx.recv() => {
                    match msg {
                        Some(ReservationMessage::Apply(op)) => {
                            self.pending.push(op);
                        }
                        Some(ReservationMessage::Flush(done)) => {
                            self.drain().await;
                            // Receiver may have given up waiting; nothing
                            // to do about it here.
                            let _ = done.send(());
                        }
                        Some(ReservationMessage::Shutdown) | None => {
                            info!("Reservation worker shutting down");
                            self.drain().await;
                            break;
                        }
                    }
                }
            }
        }

        info!("Reservation worker stopped");
    }

    /// Applies all buffered operations concurrently.
    ///
    /// Each operation is an independent atomic delta, so per-op tasks
    /// cannot corrupt each other; failures are logged and dropped.
    async fn drain(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let ops = std::mem::take(&mut self.pending);
        debug!(count = ops.len(), "Draining reservation queue");

        let mut tasks = JoinSet::new();
        for op in ops {
            let stock = self.stock.clone();
            tasks.spawn(async move {
                let result = match &op {
                    StockOp::Reduce { key, quantity } => stock.reduce_stock(key, *quantity).await,
                    StockOp::Restore { key, quantity } => stock.restore_stock(key, *quantity).await,
                };
                (op, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((op, Ok(()))) => {
                    debug!(stock_key = %op.key(), "Applied stock operation");
                }
                Ok((op, Err(e))) => {
                    warn!(
                        stock_key = %op.key(),
                        error = %e,
                        "Stock operation failed, dropping"
                    );
                }
                Err(e) => {
                    error!(?e, "Stock operation task panicked");
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
