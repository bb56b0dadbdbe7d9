//! Transfer rounds over an account pool.
//!
//! A round pairs every adjacent pool index `(i, i+1)` and launches one
//! independent transfer per pair. Rounds do not wait for their transfers:
//! workers are spawned on a shared [`TaskTracker`] and the caller paces
//! rounds by time, so consecutive rounds may overlap. The tracker lets
//! shutdown (and tests) await drain explicitly.

use crate::accounts::AccountPool;
use crate::nonce::NonceAllocator;
use crate::runner::SpammerStats;
use ethbench_types::{Fee, LedgerClient, TransferSigner, Wei};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Which side of each adjacent pair sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferDirection {
    /// Index `i+1` sends to index `i`.
    #[default]
    Descending,
    /// Index `i` sends to index `i+1`.
    Ascending,
}

impl TransferDirection {
    /// The opposite direction.
    pub fn flipped(self) -> Self {
        match self {
            Self::Descending => Self::Ascending,
            Self::Ascending => Self::Descending,
        }
    }
}

/// One scheduled transfer between two pool indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTask {
    pub from: usize,
    pub to: usize,
    pub amount: Wei,
}

/// Plan the transfers of one round over a pool of `len` accounts.
///
/// Returns `len - 1` tasks, one per adjacent pair, or none for pools
/// smaller than two.
pub fn plan_round(len: usize, direction: TransferDirection, amount: Wei) -> Vec<TransferTask> {
    (0..len.saturating_sub(1))
        .map(|i| {
            let (from, to) = match direction {
                TransferDirection::Descending => (i + 1, i),
                TransferDirection::Ascending => (i, i + 1),
            };
            TransferTask { from, to, amount }
        })
        .collect()
}

/// Launches transfer rounds for one node.
#[derive(Clone)]
pub struct TransferScheduler {
    node: usize,
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn TransferSigner>,
    nonces: Arc<NonceAllocator>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    stats: Arc<SpammerStats>,
    fee: Fee,
    amount: Wei,
}

impl TransferScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node: usize,
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn TransferSigner>,
        nonces: Arc<NonceAllocator>,
        tracker: TaskTracker,
        permits: Arc<Semaphore>,
        stats: Arc<SpammerStats>,
        fee: Fee,
        amount: Wei,
    ) -> Self {
        Self {
            node,
            ledger,
            signer,
            nonces,
            tracker,
            permits,
            stats,
            fee,
            amount,
        }
    }

    /// Launch one transfer per adjacent pair without waiting for any of them.
    ///
    /// Returns the number of transfers launched.
    pub fn run_round(&self, pool: &Arc<AccountPool>, direction: TransferDirection) -> usize {
        let tasks = plan_round(pool.len(), direction, self.amount);
        let launched = tasks.len();

        for task in tasks {
            let scheduler = self.clone();
            let pool = Arc::clone(pool);
            self.stats.launched.fetch_add(1, Ordering::Relaxed);
            self.tracker.spawn(async move {
                scheduler.execute(&pool, task).await;
            });
        }

        debug!(node = self.node, launched, ?direction, "Round launched");
        launched
    }

    /// Allocate, sign and submit one transfer. Never propagates errors.
    async fn execute(&self, pool: &AccountPool, task: TransferTask) {
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return;
        };
        let (Some(from), Some(to)) = (pool.get(task.from), pool.get(task.to)) else {
            return;
        };

        let nonce = match self.nonces.allocate(from.address, self.ledger.as_ref()).await {
            Ok(nonce) => nonce,
            Err(e) => {
                self.stats.nonce_failures.fetch_add(1, Ordering::Relaxed);
                warn!(node = self.node, sender = %from.address, error = %e, "Nonce allocation failed");
                return;
            }
        };

        let signed = match self
            .signer
            .build_and_sign(nonce, to.address, task.amount, self.fee, &from.key)
        {
            Ok(signed) => signed,
            Err(e) => {
                // The allocated nonce is now a gap until the next failed submission resets it.
                self.stats.sign_failures.fetch_add(1, Ordering::Relaxed);
                warn!(node = self.node, sender = %from.address, nonce, error = %e, "Signing failed");
                return;
            }
        };

        match self.ledger.submit(&signed).await {
            Ok(hash) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                debug!(node = self.node, sender = %from.address, nonce, %hash, "Transfer accepted");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                match self.nonces.reset(from.address, self.ledger.as_ref()).await {
                    Ok(_) => {
                        self.stats.resets.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(reset_err) => {
                        self.stats.nonce_failures.fetch_add(1, Ordering::Relaxed);
                        warn!(node = self.node, sender = %from.address, error = %reset_err, "Nonce reset failed");
                    }
                }
                warn!(
                    node = self.node,
                    sender = %from.address,
                    nonce,
                    error = %e,
                    "Transfer submission failed"
                );
            }
        }
    }
}
