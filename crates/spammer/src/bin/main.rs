//! Ethereum Transfer Load Generator CLI
//!
//! Funds a pool of fresh accounts per endpoint from a parent account, then
//! moves value between adjacent accounts in rounds until stopped.
//!
//! # Usage
//!
//! ```bash
//! # Two endpoints, 20 accounts each, stop with Ctrl+C or by typing `stop`
//! ethbench-spammer continuous \
//!     --rpc-url http://127.0.0.1:8545 \
//!     --rpc-url http://127.0.0.1:8546 \
//!     --accounts 20 --chain-id 1337 --parent-private-key 0x...
//!
//! # Same, configured through the environment (or a .env file)
//! NODES=2 RPC_URL1=http://127.0.0.1:8545 RPC_URL2=http://127.0.0.1:8546 \
//! ACCOUNTS=20 CHAIN_ID=1337 PARENT_PRIVATE_KEY=0x... \
//!     ethbench-spammer continuous
//!
//! # Generate an account
//! ethbench-spammer keygen
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ethbench_spammer::config::{parse_parent_key, rpc_urls_from_env};
use ethbench_spammer::{Spammer, SpammerConfig};
use ethbench_types::{Fee, SigningKey, Wei, DEFAULT_TRANSFER_GAS_LIMIT};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Ethereum transfer load generator
#[derive(Parser, Debug)]
#[command(name = "ethbench-spammer")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn,ethbench_spammer=info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fund account pools and run transfer rounds until stopped
    Continuous(ContinuousArgs),

    /// Generate a key pair, or print the address of an existing key
    Keygen {
        /// Existing private key (hex); a new one is generated when omitted
        #[arg(long)]
        key: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ContinuousArgs {
    /// RPC endpoint, one node per flag (defaults to RPC_URL1..RPC_URL{NODES})
    #[arg(long = "rpc-url")]
    rpc_urls: Vec<String>,

    /// Number of RPC_URLn variables to read when no --rpc-url is given
    #[arg(long, env = "NODES", default_value_t = 1)]
    nodes: usize,

    /// Accounts generated and funded per node
    #[arg(long, env = "ACCOUNTS", default_value_t = 10)]
    accounts: usize,

    /// Parent account address; checked against the private key when set
    #[arg(long, env = "PARENT_ADDRESS")]
    parent_address: Option<String>,

    /// Parent account private key (hex)
    #[arg(long, env = "PARENT_PRIVATE_KEY", hide_env_values = true)]
    parent_private_key: String,

    /// Gas price in wei
    #[arg(long, env = "GAS_PRICE_WEI", default_value = "0")]
    gas_price_wei: Wei,

    /// Gas limit per transfer
    #[arg(long, default_value_t = DEFAULT_TRANSFER_GAS_LIMIT)]
    gas_limit: u64,

    /// Chain id for replay protection
    #[arg(long, env = "CHAIN_ID")]
    chain_id: u64,

    /// Wei moved by each load transfer
    #[arg(long, default_value = "10000")]
    transfer_amount_wei: Wei,

    /// Wei sent from the parent to each account
    #[arg(long, default_value = "1000000000000000000")]
    funding_amount_wei: Wei,

    /// Wei sent once to an account still empty after settlement
    #[arg(long, default_value = "100000000000000000000")]
    top_up_amount_wei: Wei,

    /// Seconds to wait after funding before checking balances
    #[arg(long, default_value_t = 5)]
    settlement_secs: u64,

    /// Seconds to wait for in-flight transfers after stop
    #[arg(long, default_value_t = 60)]
    grace_secs: u64,

    /// Maximum transfers in flight across all nodes
    #[arg(long, default_value_t = 1024)]
    max_in_flight: usize,

    /// Stop automatically after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Return pool balances to the parent after stop
    #[arg(long)]
    sweep: bool,
}

impl ContinuousArgs {
    fn into_config(self) -> Result<SpammerConfig> {
        let rpc_urls = if self.rpc_urls.is_empty() {
            rpc_urls_from_env(self.nodes).context("No --rpc-url given")?
        } else {
            self.rpc_urls
        };
        let parent_key = parse_parent_key(&self.parent_private_key, self.parent_address.as_deref())
            .context("Invalid parent account")?;

        let config = SpammerConfig::new(rpc_urls, parent_key, self.chain_id)
            .with_accounts_per_node(self.accounts)
            .with_fee(Fee::new(self.gas_price_wei, self.gas_limit))
            .with_transfer_amount(self.transfer_amount_wei)
            .with_funding_amount(self.funding_amount_wei)
            .with_top_up_amount(self.top_up_amount_wei)
            .with_settlement_delay(Duration::from_secs(self.settlement_secs))
            .with_shutdown_grace(Duration::from_secs(self.grace_secs))
            .with_max_in_flight(self.max_in_flight)
            .with_sweep_on_stop(self.sweep);
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Command::Continuous(args) => run_continuous(args).await,
        Command::Keygen { key } => keygen(key.as_deref()),
    }
}

async fn run_continuous(args: ContinuousArgs) -> Result<()> {
    let duration = args.duration_secs.map(Duration::from_secs);
    let config = args.into_config()?;

    info!(
        nodes = config.node_count(),
        accounts_per_node = config.accounts_per_node,
        parent = %config.parent_address(),
        chain_id = config.chain_id,
        "Ethbench spammer starting"
    );

    let mut spammer = Spammer::new(config).context("Failed to create spammer")?;
    let cancel = CancellationToken::new();
    spawn_stop_listener(cancel.clone());

    if let Some(duration) = duration {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            info!("Run duration elapsed");
            cancel.cancel();
        });
    }

    let report = spammer
        .run_until_cancelled(cancel)
        .await
        .context("Spammer run failed")?;
    report.print();
    Ok(())
}

/// Cancel `cancel` on Ctrl+C, SIGTERM, or `stop` typed on stdin.
fn spawn_stop_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let console = async {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            println!("Enter stop to end test:");
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim() == "stop" {
                    return;
                }
            }
            // stdin closed: rely on signals
            std::future::pending::<()>().await;
        };

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C"),
            _ = terminate => info!("Received SIGTERM"),
            _ = console => info!("Received stop command"),
        }

        info!("Stopping, waiting for in-flight transfers...");
        cancel.cancel();
    });
}

fn keygen(key: Option<&str>) -> Result<()> {
    let key = match key {
        Some(hex) => hex.parse::<SigningKey>().context("Invalid private key")?,
        None => SigningKey::random(),
    };
    println!("address: {}", key.address());
    println!("private key: {}", key.to_hex());
    Ok(())
}
