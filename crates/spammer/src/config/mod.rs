//! Spammer configuration.

use ethbench_types::{Address, Fee, HexError, KeyError, SigningKey, Wei, TRANSFER_GAS};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Configuration for a load-test run.
///
/// Construct with [`SpammerConfig::new`] and adjust with the `with_*` setters.
/// Default pacing: a 2s start stagger per node, a round every `2s * nodes`,
/// a 5s settlement wait and a one-minute shutdown grace.
#[derive(Debug, Clone)]
pub struct SpammerConfig {
    /// JSON-RPC endpoints, one node runner per endpoint.
    pub rpc_endpoints: Vec<String>,

    /// Accounts generated and funded for each endpoint.
    pub accounts_per_node: usize,

    /// Funded parent account that bootstraps every pool.
    pub parent_key: SigningKey,

    /// Chain id for EIP-155 signatures.
    pub chain_id: u64,

    /// Gas price and limit attached to every transfer.
    pub fee: Fee,

    /// Amount moved by each load transfer.
    pub transfer_amount: Wei,

    /// Amount sent from the parent to each pool account.
    pub funding_amount: Wei,

    /// Amount of the single top-up sent to an account still empty after settlement.
    pub top_up_amount: Wei,

    /// Balance left behind in each account when sweeping back to the parent.
    pub sweep_reserve: Wei,

    /// Wait after funding before trusting balance queries.
    pub settlement_delay: Duration,

    /// Start delay added per node index so nodes do not burst together.
    pub stagger_interval: Duration,

    /// Round pacing per configured node; the effective interval is this times the node count.
    pub round_interval_per_node: Duration,

    /// Upper bound on waiting for in-flight transfers after stop.
    pub shutdown_grace: Duration,

    /// How often progress is logged.
    pub progress_interval: Duration,

    /// Maximum transfers in flight across all nodes.
    pub max_in_flight: usize,

    /// Per-request timeout for the RPC client.
    pub request_timeout: Duration,

    /// Sweep pool balances back to the parent after stop.
    pub sweep_on_stop: bool,
}

impl SpammerConfig {
    /// Create a configuration with default amounts and pacing.
    pub fn new(rpc_endpoints: Vec<String>, parent_key: SigningKey, chain_id: u64) -> Self {
        Self {
            rpc_endpoints,
            accounts_per_node: 10,
            parent_key,
            chain_id,
            fee: Fee::default(),
            transfer_amount: Wei(10_000),
            funding_amount: Wei::from_ether(1),
            top_up_amount: Wei::from_ether(100),
            sweep_reserve: Wei(1_000_000_000_000_000),
            settlement_delay: Duration::from_secs(5),
            stagger_interval: Duration::from_secs(2),
            round_interval_per_node: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(60),
            progress_interval: Duration::from_secs(10),
            max_in_flight: 1024,
            request_timeout: Duration::from_secs(30),
            sweep_on_stop: false,
        }
    }

    pub fn with_accounts_per_node(mut self, accounts: usize) -> Self {
        self.accounts_per_node = accounts;
        self
    }

    pub fn with_fee(mut self, fee: Fee) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_transfer_amount(mut self, amount: Wei) -> Self {
        self.transfer_amount = amount;
        self
    }

    pub fn with_funding_amount(mut self, amount: Wei) -> Self {
        self.funding_amount = amount;
        self
    }

    pub fn with_top_up_amount(mut self, amount: Wei) -> Self {
        self.top_up_amount = amount;
        self
    }

    pub fn with_sweep_reserve(mut self, reserve: Wei) -> Self {
        self.sweep_reserve = reserve;
        self
    }

    pub fn with_settlement_delay(mut self, delay: Duration) -> Self {
        self.settlement_delay = delay;
        self
    }

    pub fn with_stagger_interval(mut self, interval: Duration) -> Self {
        self.stagger_interval = interval;
        self
    }

    pub fn with_round_interval_per_node(mut self, interval: Duration) -> Self {
        self.round_interval_per_node = interval;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_sweep_on_stop(mut self, sweep: bool) -> Self {
        self.sweep_on_stop = sweep;
        self
    }

    /// Number of nodes (endpoints) in the run.
    pub fn node_count(&self) -> usize {
        self.rpc_endpoints.len()
    }

    /// Pause between rounds on each node.
    pub fn round_interval(&self) -> Duration {
        self.round_interval_per_node * self.node_count().max(1) as u32
    }

    /// Start delay for the node at `index` (0-based).
    pub fn stagger_for(&self, index: usize) -> Duration {
        self.stagger_interval * index as u32
    }

    /// Parent account address.
    pub fn parent_address(&self) -> Address {
        self.parent_key.address()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.accounts_per_node < 2 {
            return Err(ConfigError::TooFewAccounts(self.accounts_per_node));
        }
        for (name, amount) in [
            ("transfer_amount", self.transfer_amount),
            ("funding_amount", self.funding_amount),
            ("top_up_amount", self.top_up_amount),
        ] {
            if amount.is_zero() {
                return Err(ConfigError::ZeroAmount(name));
            }
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::InvalidMaxInFlight);
        }
        if self.max_in_flight > Semaphore::MAX_PERMITS {
            return Err(ConfigError::MaxInFlightTooLarge(self.max_in_flight));
        }
        if self.fee.gas_limit < TRANSFER_GAS {
            return Err(ConfigError::GasLimitTooLow(self.fee.gas_limit));
        }
        Ok(())
    }
}

/// Parse the parent key, checking it against an explicitly configured address.
pub fn parse_parent_key(
    key_hex: &str,
    expected_address: Option<&str>,
) -> Result<SigningKey, ConfigError> {
    let key: SigningKey = key_hex.parse().map_err(ConfigError::InvalidParentKey)?;

    if let Some(expected) = expected_address.filter(|s| !s.trim().is_empty()) {
        let configured: Address = expected
            .parse()
            .map_err(ConfigError::InvalidParentAddress)?;
        let derived = key.address();
        if configured != derived {
            return Err(ConfigError::ParentAddressMismatch {
                configured,
                derived,
            });
        }
    }

    Ok(key)
}

/// Collect `RPC_URL1..=RPC_URL{nodes}` from the environment.
pub fn rpc_urls_from_env(nodes: usize) -> Result<Vec<String>, ConfigError> {
    (1..=nodes)
        .map(|i| {
            let name = format!("RPC_URL{}", i);
            std::env::var(&name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        })
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("At least one RPC endpoint is required")]
    NoEndpoints,

    #[error("At least 2 accounts per node are required, got {0}")]
    TooFewAccounts(usize),

    #[error("{0} must be greater than zero")]
    ZeroAmount(&'static str),

    #[error("max_in_flight must be at least 1")]
    InvalidMaxInFlight,

    #[error("max_in_flight {0} exceeds the semaphore permit limit")]
    MaxInFlightTooLarge(usize),

    #[error("Gas limit {0} is below the transfer minimum of 21000")]
    GasLimitTooLow(u64),

    #[error("Missing environment variable {0}")]
    MissingEnv(String),

    #[error("Invalid parent private key: {0}")]
    InvalidParentKey(KeyError),

    #[error("Invalid parent address: {0}")]
    InvalidParentAddress(HexError),

    #[error("Parent address {configured} does not match the key's address {derived}")]
    ParentAddressMismatch { configured: Address, derived: Address },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoints: usize) -> SpammerConfig {
        let urls = (0..endpoints).map(|i| format!("http://node{}:8545", i)).collect();
        SpammerConfig::new(urls, SigningKey::random(), 1337)
    }

    #[test]
    fn test_defaults_validate() {
        assert!(config(1).validate().is_ok());
    }

    #[test]
    fn test_pacing_scales_with_nodes() {
        let config = config(3);
        assert_eq!(config.round_interval(), Duration::from_secs(6));
        assert_eq!(config.stagger_for(0), Duration::ZERO);
        assert_eq!(config.stagger_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(config(0).validate(), Err(ConfigError::NoEndpoints)));
        assert!(matches!(
            config(1).with_accounts_per_node(1).validate(),
            Err(ConfigError::TooFewAccounts(1))
        ));
        assert!(matches!(
            config(1).with_transfer_amount(Wei::ZERO).validate(),
            Err(ConfigError::ZeroAmount("transfer_amount"))
        ));
        assert!(matches!(
            config(1).with_max_in_flight(0).validate(),
            Err(ConfigError::InvalidMaxInFlight)
        ));
        assert!(matches!(
            config(1).with_max_in_flight(usize::MAX).validate(),
            Err(ConfigError::MaxInFlightTooLarge(usize::MAX))
        ));
        assert!(config(1)
            .with_max_in_flight(Semaphore::MAX_PERMITS)
            .validate()
            .is_ok());
        assert!(matches!(
            config(1).with_fee(Fee::new(Wei(1), 20_000)).validate(),
            Err(ConfigError::GasLimitTooLow(20_000))
        ));
    }

    #[test]
    fn test_parse_parent_key_checks_address() {
        let key = SigningKey::random();
        let address = key.address().to_checksum();

        let parsed = parse_parent_key(&key.to_hex(), Some(&address)).unwrap();
        assert_eq!(parsed, key);

        let parsed = parse_parent_key(&key.to_hex(), None).unwrap();
        assert_eq!(parsed.address(), key.address());

        let other = SigningKey::random().address().to_checksum();
        assert!(matches!(
            parse_parent_key(&key.to_hex(), Some(&other)),
            Err(ConfigError::ParentAddressMismatch { .. })
        ));
        assert!(matches!(
            parse_parent_key("0x1234", None),
            Err(ConfigError::InvalidParentKey(_))
        ));
    }

    #[test]
    fn test_rpc_urls_from_env_reports_missing() {
        // Index far beyond anything a developer environment would define.
        let err = rpc_urls_from_env(9999).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(_)));
    }
}
