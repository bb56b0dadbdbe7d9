//! Account pools and parent-account funding.
//!
//! Each node runner owns one [`AccountPool`] of freshly generated accounts.
//! The [`AccountFunder`] bootstraps pools from a funded parent account before
//! any load is generated, and can optionally sweep balances back afterwards.

use crate::config::SpammerConfig;
use crate::nonce::NonceAllocator;
use ethbench_types::{
    Account, Address, Fee, Hash, KeyProvider, LedgerClient, LedgerError, SignError,
    TransferSigner, Wei,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fixed-size, ordered pool of accounts belonging to one node.
///
/// Index order defines transfer pairing: rounds move funds between
/// adjacent indices.
#[derive(Debug, Clone)]
pub struct AccountPool {
    accounts: Vec<Account>,
}

impl AccountPool {
    /// Generate `count` fresh accounts. No network interaction.
    pub fn generate(count: usize, keys: &dyn KeyProvider) -> Self {
        let accounts = (0..count).map(|_| Account::generate(keys)).collect();
        Self { accounts }
    }

    /// Build a pool from existing accounts, keeping their order.
    pub fn from_accounts(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Account> {
        self.accounts.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> + '_ {
        self.accounts.iter()
    }

    /// Addresses in pool order.
    pub fn addresses(&self) -> Vec<Address> {
        self.accounts.iter().map(|a| a.address).collect()
    }
}

/// Outcome of a successful [`AccountFunder::fund`].
#[derive(Debug, Clone, Default)]
pub struct FundingReport {
    /// Accounts that received the initial funding transfer.
    pub funded: usize,
    /// Accounts that were empty after settlement and got a top-up.
    pub topped_up: Vec<Address>,
    /// Total value sent from the parent, fees excluded.
    pub total_sent: Wei,
}

/// Outcome of an [`AccountFunder::sweep`].
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Accounts whose balance was returned to the parent.
    pub swept: usize,
    /// Accounts at or below the reserve.
    pub skipped: usize,
    /// Accounts whose balance query or transfer failed.
    pub failed: usize,
    /// Total value returned, fees excluded.
    pub total_returned: Wei,
}

/// Funds account pools from a parent account.
///
/// Parent transfers go out strictly one at a time and take their sequence
/// numbers from the shared [`NonceAllocator`], so the parent never races
/// itself.
pub struct AccountFunder {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn TransferSigner>,
    nonces: Arc<NonceAllocator>,
    parent: Account,
    fee: Fee,
    funding_amount: Wei,
    top_up_amount: Wei,
    sweep_reserve: Wei,
    settlement_delay: Duration,
}

impl AccountFunder {
    /// Create a funder that submits through `ledger`.
    pub fn new(
        config: &SpammerConfig,
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn TransferSigner>,
        nonces: Arc<NonceAllocator>,
    ) -> Self {
        Self {
            ledger,
            signer,
            nonces,
            parent: Account::from_key(config.parent_key.clone()),
            fee: config.fee,
            funding_amount: config.funding_amount,
            top_up_amount: config.top_up_amount,
            sweep_reserve: config.sweep_reserve,
            settlement_delay: config.settlement_delay,
        }
    }

    /// Parent account address.
    pub fn parent(&self) -> Address {
        self.parent.address
    }

    /// Fund every account in `pool` and verify it holds a non-zero balance.
    ///
    /// Any member still empty after the settlement delay gets exactly one
    /// top-up; if it is empty after a second settlement delay, funding fails.
    pub async fn fund(&self, pool: &AccountPool) -> Result<FundingReport, FundingError> {
        let parent_balance = self.balance(self.parent.address).await?;
        if parent_balance.is_zero() {
            return Err(FundingError::ParentUnfunded(self.parent.address));
        }

        info!(
            parent = %self.parent.address,
            balance = %parent_balance.to_ether_string(),
            accounts = pool.len(),
            endpoint = self.ledger.endpoint(),
            "Funding account pool"
        );

        let mut report = FundingReport::default();
        for account in pool.iter() {
            self.transfer_from_parent(account.address, self.funding_amount)
                .await?;
            report.funded += 1;
            report.total_sent = report.total_sent.saturating_add(self.funding_amount);
        }

        tokio::time::sleep(self.settlement_delay).await;

        for account in pool.iter() {
            if self.balance(account.address).await?.is_zero() {
                warn!(account = %account.address, "Account empty after settlement, topping up");
                self.transfer_from_parent(account.address, self.top_up_amount)
                    .await?;
                report.topped_up.push(account.address);
                report.total_sent = report.total_sent.saturating_add(self.top_up_amount);
            }
        }

        if !report.topped_up.is_empty() {
            tokio::time::sleep(self.settlement_delay).await;
            for &address in &report.topped_up {
                if self.balance(address).await?.is_zero() {
                    return Err(FundingError::AccountUnfunded(address));
                }
            }
        }

        info!(
            funded = report.funded,
            topped_up = report.topped_up.len(),
            total = %report.total_sent.to_ether_string(),
            "Account pool funded"
        );
        Ok(report)
    }

    /// Return each member's balance above the reserve to the parent.
    ///
    /// Best effort: failures are logged and skipped.
    pub async fn sweep(&self, pool: &AccountPool) -> SweepReport {
        let mut report = SweepReport::default();

        for account in pool.iter() {
            let balance = match self.ledger.get_balance(account.address).await {
                Ok(balance) => balance,
                Err(e) => {
                    warn!(account = %account.address, error = %e, "Sweep balance query failed");
                    report.failed += 1;
                    continue;
                }
            };

            let Some(amount) = balance
                .checked_sub(self.sweep_reserve)
                .filter(|amount| !amount.is_zero())
            else {
                report.skipped += 1;
                continue;
            };

            match self.sweep_account(account, amount).await {
                Ok(hash) => {
                    debug!(account = %account.address, %hash, amount = %amount, "Swept account");
                    report.swept += 1;
                    report.total_returned = report.total_returned.saturating_add(amount);
                }
                Err(e) => {
                    warn!(account = %account.address, error = %e, "Sweep transfer failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            swept = report.swept,
            skipped = report.skipped,
            failed = report.failed,
            returned = %report.total_returned.to_ether_string(),
            "Swept account pool"
        );
        report
    }

    async fn sweep_account(&self, account: &Account, amount: Wei) -> Result<Hash, FundingError> {
        let nonce = self
            .nonces
            .allocate(account.address, self.ledger.as_ref())
            .await
            .map_err(FundingError::Nonce)?;
        let signed = self
            .signer
            .build_and_sign(nonce, self.parent.address, amount, self.fee, &account.key)
            .map_err(FundingError::Sign)?;

        match self.ledger.submit(&signed).await {
            Ok(hash) => Ok(hash),
            Err(source) => {
                self.reset_quietly(account.address).await;
                Err(FundingError::Submission {
                    to: self.parent.address,
                    source,
                })
            }
        }
    }

    async fn transfer_from_parent(&self, to: Address, amount: Wei) -> Result<Hash, FundingError> {
        let nonce = self
            .nonces
            .allocate(self.parent.address, self.ledger.as_ref())
            .await
            .map_err(FundingError::Nonce)?;
        let signed = self
            .signer
            .build_and_sign(nonce, to, amount, self.fee, &self.parent.key)
            .map_err(FundingError::Sign)?;

        match self.ledger.submit(&signed).await {
            Ok(hash) => {
                debug!(%to, nonce, %hash, "Funding transfer submitted");
                Ok(hash)
            }
            Err(source) => {
                self.reset_quietly(self.parent.address).await;
                Err(FundingError::Submission { to, source })
            }
        }
    }

    async fn reset_quietly(&self, sender: Address) {
        if let Err(e) = self.nonces.reset(sender, self.ledger.as_ref()).await {
            warn!(%sender, error = %e, "Nonce reset failed");
        }
    }

    async fn balance(&self, address: Address) -> Result<Wei, FundingError> {
        self.ledger
            .get_balance(address)
            .await
            .map_err(|source| FundingError::BalanceQuery { address, source })
    }
}

/// Errors that abort funding.
#[derive(Debug, thiserror::Error)]
pub enum FundingError {
    #[error("Parent account {0} has no balance")]
    ParentUnfunded(Address),

    #[error("Balance query for {address} failed: {source}")]
    BalanceQuery {
        address: Address,
        #[source]
        source: LedgerError,
    },

    #[error("Nonce allocation failed: {0}")]
    Nonce(#[source] LedgerError),

    #[error("Signing failed: {0}")]
    Sign(#[source] SignError),

    #[error("Funding transfer to {to} failed: {source}")]
    Submission {
        to: Address,
        #[source]
        source: LedgerError,
    },

    #[error("Account {0} still has no balance after top-up")]
    AccountUnfunded(Address),
}
