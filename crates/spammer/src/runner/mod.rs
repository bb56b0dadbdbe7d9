//! Spammer runner that funds account pools and drives one loop per node.

use crate::accounts::{AccountFunder, AccountPool, FundingError, FundingReport};
use crate::client::{RpcClient, RpcError};
use crate::config::{ConfigError, SpammerConfig};
use crate::nonce::NonceAllocator;
use crate::workloads::{TransferDirection, TransferScheduler};
use ethbench_types::{
    Address, KeyProvider, LedgerClient, LegacyTransferSigner, Secp256k1KeyProvider, TransferSigner,
};
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Load generator over a set of ledger endpoints.
///
/// One account pool is funded per endpoint, all from the first endpoint,
/// before any node starts generating load. Each node then runs its own
/// round loop against its own endpoint. Every worker in the process shares
/// one [`NonceAllocator`], one task tracker and one in-flight limit.
pub struct Spammer {
    config: SpammerConfig,
    clients: Vec<Arc<dyn LedgerClient>>,
    keys: Arc<dyn KeyProvider>,
    signer: Arc<dyn TransferSigner>,
    nonces: Arc<NonceAllocator>,
    stats: Arc<SpammerStats>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    pools: Vec<Arc<AccountPool>>,
}

impl Spammer {
    /// Create a spammer that talks JSON-RPC to the configured endpoints.
    pub fn new(config: SpammerConfig) -> Result<Self, SpammerError> {
        config.validate()?;

        let clients = config
            .rpc_endpoints
            .iter()
            .map(|url| {
                RpcClient::new(url.clone(), config.request_timeout)
                    .map(|client| Arc::new(client) as Arc<dyn LedgerClient>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let signer = Arc::new(LegacyTransferSigner::new(config.chain_id));

        Self::with_backends(config, clients, Arc::new(Secp256k1KeyProvider), signer)
    }

    /// Create a spammer over explicit collaborators, one client per endpoint.
    pub fn with_backends(
        config: SpammerConfig,
        clients: Vec<Arc<dyn LedgerClient>>,
        keys: Arc<dyn KeyProvider>,
        signer: Arc<dyn TransferSigner>,
    ) -> Result<Self, SpammerError> {
        config.validate()?;
        if clients.is_empty() {
            return Err(SpammerError::NoEndpoints);
        }
        if clients.len() != config.node_count() {
            return Err(SpammerError::ClientMismatch {
                endpoints: config.node_count(),
                clients: clients.len(),
            });
        }

        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
            clients,
            keys,
            signer,
            nonces: Arc::new(NonceAllocator::new()),
            stats: Arc::new(SpammerStats::default()),
            tracker: TaskTracker::new(),
            pools: Vec::new(),
        })
    }

    fn funder(&self) -> AccountFunder {
        AccountFunder::new(
            &self.config,
            Arc::clone(&self.clients[0]),
            Arc::clone(&self.signer),
            Arc::clone(&self.nonces),
        )
    }

    /// Generate and fund one account pool per endpoint.
    ///
    /// All funding goes through the first endpoint. Fails without starting
    /// any node if the parent or any account cannot be funded.
    pub async fn prepare(&mut self) -> Result<Vec<FundingReport>, SpammerError> {
        let funder = self.funder();
        let mut pools = Vec::with_capacity(self.clients.len());
        let mut reports = Vec::with_capacity(self.clients.len());

        for node in 0..self.clients.len() {
            let pool = AccountPool::generate(self.config.accounts_per_node, self.keys.as_ref());
            info!(node, accounts = pool.len(), "Generated account pool");
            reports.push(funder.fund(&pool).await?);
            pools.push(Arc::new(pool));
        }

        self.pools = pools;
        Ok(reports)
    }

    /// Run the spammer for a specified duration.
    pub async fn run_for(&mut self, duration: Duration) -> Result<SpammerReport, SpammerError> {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();

        // Spawn a task to cancel after duration
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            cancel_clone.cancel();
        });

        self.run_until_cancelled(cancel).await
    }

    /// Run until the cancellation token is triggered, then drain in-flight
    /// transfers for at most the shutdown grace period.
    ///
    /// Funds pools first if [`Spammer::prepare`] has not been called.
    pub async fn run_until_cancelled(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<SpammerReport, SpammerError> {
        if self.pools.is_empty() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SpammerError::Cancelled),
                prepared = self.prepare() => { prepared?; }
            }
        }

        let start = Instant::now();
        self.tracker.reopen();

        info!(
            nodes = self.clients.len(),
            accounts_per_node = self.config.accounts_per_node,
            round_interval_ms = self.config.round_interval().as_millis() as u64,
            max_in_flight = self.config.max_in_flight,
            "Starting spammer"
        );

        let progress_cancel = cancel.child_token();
        let progress_handle = tokio::spawn(report_progress(
            Arc::clone(&self.stats),
            start,
            self.config.progress_interval,
            progress_cancel.clone(),
        ));

        let handles: Vec<_> = self
            .pools
            .iter()
            .enumerate()
            .map(|(node, pool)| {
                let scheduler = TransferScheduler::new(
                    node,
                    Arc::clone(&self.clients[node]),
                    Arc::clone(&self.signer),
                    Arc::clone(&self.nonces),
                    self.tracker.clone(),
                    Arc::clone(&self.permits),
                    Arc::clone(&self.stats),
                    self.config.fee,
                    self.config.transfer_amount,
                );
                let runner = NodeRunner::new(
                    node,
                    self.clients[node].endpoint(),
                    Arc::clone(pool),
                    scheduler,
                    self.config.stagger_for(node),
                    self.config.round_interval(),
                );
                tokio::spawn(runner.run(cancel.clone()))
            })
            .collect();

        let mut nodes = Vec::with_capacity(handles.len());
        for result in join_all(handles).await {
            match result {
                Ok(report) => nodes.push(report),
                Err(e) => warn!(error = %e, "Node runner task failed"),
            }
        }

        self.tracker.close();
        let in_flight = self.tracker.len();
        let drained = tokio::time::timeout(self.config.shutdown_grace, self.tracker.wait())
            .await
            .is_ok();
        if drained {
            info!(in_flight, "In-flight transfers drained");
        } else {
            warn!(
                remaining = self.tracker.len(),
                grace_secs = self.config.shutdown_grace.as_secs(),
                "Shutdown grace expired with transfers still in flight"
            );
        }

        progress_cancel.cancel();
        let _ = progress_handle.await;

        if self.config.sweep_on_stop {
            let funder = self.funder();
            for pool in &self.pools {
                funder.sweep(pool).await;
            }
        }

        let counters = self.stats.snapshot();
        let report = SpammerReport {
            duration: start.elapsed(),
            counters,
            avg_tps: self.stats.tps(start),
            nodes,
            drained,
        };
        log_progress(&counters, start.elapsed(), report.avg_tps);
        Ok(report)
    }

    /// Get current statistics.
    pub fn stats(&self) -> &SpammerStats {
        &self.stats
    }

    /// The process-wide nonce allocator.
    pub fn nonces(&self) -> &Arc<NonceAllocator> {
        &self.nonces
    }

    /// Funded pools, one per node. Empty until prepared.
    pub fn pools(&self) -> &[Arc<AccountPool>] {
        &self.pools
    }

    /// Address of the parent account.
    pub fn parent_address(&self) -> Address {
        self.config.parent_address()
    }
}

/// Round loop for one endpoint and its account pool.
pub struct NodeRunner {
    node: usize,
    endpoint: String,
    pool: Arc<AccountPool>,
    scheduler: TransferScheduler,
    stagger: Duration,
    round_interval: Duration,
}

impl NodeRunner {
    pub fn new(
        node: usize,
        endpoint: impl Into<String>,
        pool: Arc<AccountPool>,
        scheduler: TransferScheduler,
        stagger: Duration,
        round_interval: Duration,
    ) -> Self {
        Self {
            node,
            endpoint: endpoint.into(),
            pool,
            scheduler,
            stagger,
            round_interval,
        }
    }

    /// Run rounds until `cancel` fires.
    ///
    /// Cancellation is observed between rounds: transfers already launched
    /// keep running, and no round starts once it has been seen.
    pub async fn run(self, cancel: CancellationToken) -> NodeReport {
        let mut report = NodeReport {
            node: self.node,
            endpoint: self.endpoint.clone(),
            rounds: 0,
            launched: 0,
        };

        if !sleep_unless_cancelled(self.stagger, &cancel).await {
            return report;
        }

        info!(
            node = self.node,
            endpoint = %self.endpoint,
            accounts = self.pool.len(),
            "Node runner started"
        );

        let mut direction = TransferDirection::default();
        while !cancel.is_cancelled() {
            report.launched += self.scheduler.run_round(&self.pool, direction) as u64;
            report.rounds += 1;

            if !sleep_unless_cancelled(self.round_interval, &cancel).await {
                break;
            }
            direction = direction.flipped();
        }

        info!(
            node = self.node,
            rounds = report.rounds,
            launched = report.launched,
            "Node runner stopped"
        );
        report
    }
}

/// Sleep for `duration`. Returns `false` if cancelled first.
async fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

async fn report_progress(
    stats: Arc<SpammerStats>,
    start: Instant,
    interval: Duration,
    cancel: CancellationToken,
) {
    while sleep_unless_cancelled(interval, &cancel).await {
        log_progress(&stats.snapshot(), start.elapsed(), stats.tps(start));
    }
}

fn log_progress(counters: &StatsSnapshot, elapsed: Duration, tps: f64) {
    info!(
        elapsed_secs = elapsed.as_secs(),
        launched = counters.launched,
        accepted = counters.accepted,
        failed = counters.failed,
        resets = counters.resets,
        nonce_failures = counters.nonce_failures,
        sign_failures = counters.sign_failures,
        tps = format_args!("{:.0}", tps),
        "Progress"
    );
}

/// Statistics collected during spamming.
#[derive(Debug, Default)]
pub struct SpammerStats {
    /// Transfers handed to workers.
    pub launched: AtomicU64,
    /// Transfers the endpoint accepted.
    pub accepted: AtomicU64,
    /// Transfers the endpoint rejected or that failed in transport.
    pub failed: AtomicU64,
    /// Successful nonce resets after failed submissions.
    pub resets: AtomicU64,
    /// Nonce allocations or resets that could not reach the endpoint.
    pub nonce_failures: AtomicU64,
    /// Signing failures; each leaves a nonce gap.
    pub sign_failures: AtomicU64,
}

impl SpammerStats {
    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            launched: self.launched.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            nonce_failures: self.nonce_failures.load(Ordering::Relaxed),
            sign_failures: self.sign_failures.load(Ordering::Relaxed),
        }
    }

    /// Launched transfers per second since `start`.
    pub fn tps(&self, start: Instant) -> f64 {
        let elapsed = start.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.launched.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Fraction of launched transfers that were accepted.
    pub fn acceptance_rate(&self) -> f64 {
        let launched = self.launched.load(Ordering::Relaxed);
        if launched > 0 {
            self.accepted.load(Ordering::Relaxed) as f64 / launched as f64
        } else {
            0.0
        }
    }
}

/// Copy of [`SpammerStats`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub launched: u64,
    pub accepted: u64,
    pub failed: u64,
    pub resets: u64,
    pub nonce_failures: u64,
    pub sign_failures: u64,
}

/// Per-node outcome of a run.
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub node: usize,
    pub endpoint: String,
    pub rounds: u64,
    pub launched: u64,
}

/// Report generated after a spammer run.
#[derive(Debug, Clone)]
pub struct SpammerReport {
    /// Total duration of the run, drain included.
    pub duration: Duration,
    /// Final counters.
    pub counters: StatsSnapshot,
    /// Average launched transfers per second.
    pub avg_tps: f64,
    /// Per-node round counts.
    pub nodes: Vec<NodeReport>,
    /// Whether every in-flight transfer finished within the grace period.
    pub drained: bool,
}

impl SpammerReport {
    /// Print the report to stdout.
    pub fn print(&self) {
        println!("\n=== Spammer Report ===");
        println!("Duration: {:?}", self.duration);
        println!("Launched: {}", self.counters.launched);
        println!("Accepted: {}", self.counters.accepted);
        println!("Failed: {}", self.counters.failed);
        println!("Nonce resets: {}", self.counters.resets);
        println!("Nonce failures: {}", self.counters.nonce_failures);
        println!("Sign failures: {}", self.counters.sign_failures);
        println!("Avg TPS: {:.2}", self.avg_tps);
        if !self.drained {
            println!("Warning: shutdown grace expired before all transfers finished");
        }
        for node in &self.nodes {
            println!(
                "  node {} ({}): {} rounds, {} transfers",
                node.node, node.endpoint, node.rounds, node.launched
            );
        }
    }
}

/// Errors that can occur during spamming.
#[derive(Debug, thiserror::Error)]
pub enum SpammerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Funding failed: {0}")]
    Funding(#[from] FundingError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("No ledger endpoints")]
    NoEndpoints,

    #[error("Configured {endpoints} endpoints but got {clients} clients")]
    ClientMismatch { endpoints: usize, clients: usize },

    #[error("Cancelled before load generation started")]
    Cancelled,
}
