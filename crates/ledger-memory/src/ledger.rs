//! In-memory ledger state and the [`LedgerClient`] implementation.

use async_trait::async_trait;
use ethbench_types::{
    Address, Hash, LedgerClient, LedgerError, SignedTransfer, Wei, TRANSFER_GAS,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// JSON-RPC style error code used for every rejection.
const REJECT_CODE: i64 = -32000;

/// Injected faults.
///
/// Counters are consumed one per matching event, so a fault of `n` affects
/// exactly the next `n` matching operations.
#[derive(Debug, Default, Clone)]
pub struct Faults {
    /// Reject the next N submissions from this sender without consuming its nonce.
    pub reject_from: HashMap<Address, usize>,
    /// Accept the next N transfers to this recipient but never credit them.
    pub swallow_credit_to: HashMap<Address, usize>,
    /// Fail every balance query.
    pub fail_balance_queries: bool,
    /// Fail every pending-nonce query.
    pub fail_nonce_queries: bool,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Address, Wei>,
    /// Next executable nonce per sender.
    nonces: HashMap<Address, u64>,
    /// Future-nonce transfers waiting for the gap to close.
    queued: HashMap<Address, BTreeMap<u64, SignedTransfer>>,
    /// Every submission the ledger accepted, in arrival order.
    accepted: Vec<SignedTransfer>,
    nonce_queries: HashMap<Address, usize>,
    faults: Faults,
}

impl LedgerState {
    fn next_nonce(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    fn balance(&self, address: &Address) -> Wei {
        self.balances.get(address).copied().unwrap_or(Wei::ZERO)
    }

    /// Execute a transfer whose nonce is the sender's next nonce.
    fn execute(&mut self, tx: &SignedTransfer) -> Result<(), LedgerError> {
        let cost = Wei(tx.fee.gas_price.0.saturating_mul(TRANSFER_GAS as u128));
        let total = tx.value.saturating_add(cost);
        let remaining = self.balance(&tx.from).checked_sub(total).ok_or_else(|| {
            rejected(format!(
                "insufficient funds for gas * price + value: have {} want {}",
                self.balance(&tx.from),
                total
            ))
        })?;

        self.balances.insert(tx.from, remaining);
        *self.nonces.entry(tx.from).or_insert(0) += 1;

        let swallowed = match self.faults.swallow_credit_to.get_mut(&tx.to) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        };
        if !swallowed {
            let credited = self.balance(&tx.to).saturating_add(tx.value);
            self.balances.insert(tx.to, credited);
        }
        Ok(())
    }

    /// Execute queued transfers that have become contiguous.
    fn promote(&mut self, sender: Address) {
        loop {
            let next = self.next_nonce(&sender);
            let Some(tx) = self.queued.get_mut(&sender).and_then(|q| q.remove(&next)) else {
                return;
            };
            if self.execute(&tx).is_err() {
                // Unfunded queued transfers are dropped, as a pool would evict them.
                return;
            }
        }
    }
}

fn rejected(message: impl Into<String>) -> LedgerError {
    LedgerError::Rejected {
        code: REJECT_CODE,
        message: message.into(),
    }
}

/// An in-memory ledger endpoint.
pub struct MemoryLedger {
    label: String,
    latency: Duration,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            latency: Duration::ZERO,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Delay every operation by `latency` to widen race windows in tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Add funds to an address out of band (genesis allocation).
    pub fn credit(&self, address: Address, amount: Wei) {
        let mut state = self.state.lock();
        let balance = state.balance(&address).saturating_add(amount);
        state.balances.insert(address, balance);
    }

    /// Force the next executable nonce of an address.
    pub fn set_pending_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().nonces.insert(address, nonce);
    }

    /// Current balance, without latency or faults.
    pub fn balance_of(&self, address: Address) -> Wei {
        self.state.lock().balance(&address)
    }

    /// Next executable nonce, without latency or faults.
    pub fn pending_nonce_of(&self, address: Address) -> u64 {
        self.state.lock().next_nonce(&address)
    }

    /// Reject the next `count` submissions from `sender`.
    pub fn reject_next_from(&self, sender: Address, count: usize) {
        *self
            .state
            .lock()
            .faults
            .reject_from
            .entry(sender)
            .or_insert(0) += count;
    }

    /// Accept but never credit the next `count` transfers to `recipient`.
    pub fn swallow_next_credit_to(&self, recipient: Address, count: usize) {
        *self
            .state
            .lock()
            .faults
            .swallow_credit_to
            .entry(recipient)
            .or_insert(0) += count;
    }

    /// Make balance queries fail (or succeed again).
    pub fn set_fail_balance_queries(&self, fail: bool) {
        self.state.lock().faults.fail_balance_queries = fail;
    }

    /// Make pending-nonce queries fail (or succeed again).
    pub fn set_fail_nonce_queries(&self, fail: bool) {
        self.state.lock().faults.fail_nonce_queries = fail;
    }

    /// All accepted submissions, in arrival order.
    pub fn accepted(&self) -> Vec<SignedTransfer> {
        self.state.lock().accepted.clone()
    }

    /// Number of accepted submissions addressed to `recipient`.
    pub fn accepted_count_to(&self, recipient: Address) -> usize {
        self.state
            .lock()
            .accepted
            .iter()
            .filter(|tx| tx.to == recipient)
            .count()
    }

    /// Number of accepted submissions sent by `sender`.
    pub fn accepted_count_from(&self, sender: Address) -> usize {
        self.state
            .lock()
            .accepted
            .iter()
            .filter(|tx| tx.from == sender)
            .count()
    }

    /// Number of pending-nonce queries made for `address`.
    pub fn nonce_query_count(&self, address: Address) -> usize {
        self.state
            .lock()
            .nonce_queries
            .get(&address)
            .copied()
            .unwrap_or(0)
    }

    /// Number of future-nonce transfers waiting for `sender`.
    pub fn queued_count(&self, sender: Address) -> usize {
        self.state
            .lock()
            .queued
            .get(&sender)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn get_balance(&self, address: Address) -> Result<Wei, LedgerError> {
        self.simulate_latency().await;
        let state = self.state.lock();
        if state.faults.fail_balance_queries {
            return Err(LedgerError::Transport("injected balance query failure".into()));
        }
        Ok(state.balance(&address))
    }

    async fn get_pending_nonce(&self, address: Address) -> Result<u64, LedgerError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();
        *state.nonce_queries.entry(address).or_insert(0) += 1;
        if state.faults.fail_nonce_queries {
            return Err(LedgerError::Transport("injected nonce query failure".into()));
        }
        Ok(state.next_nonce(&address))
    }

    async fn submit(&self, transfer: &SignedTransfer) -> Result<Hash, LedgerError> {
        self.simulate_latency().await;
        let mut state = self.state.lock();

        if let Some(n) = state.faults.reject_from.get_mut(&transfer.from) {
            if *n > 0 {
                *n -= 1;
                return Err(rejected("injected submission failure"));
            }
        }

        let expected = state.next_nonce(&transfer.from);
        match transfer.nonce.cmp(&expected) {
            std::cmp::Ordering::Less => {
                return Err(rejected(format!(
                    "nonce too low: next nonce {}, tx nonce {}",
                    expected, transfer.nonce
                )));
            }
            std::cmp::Ordering::Greater => {
                state
                    .queued
                    .entry(transfer.from)
                    .or_default()
                    .insert(transfer.nonce, transfer.clone());
            }
            std::cmp::Ordering::Equal => {
                state.execute(transfer)?;
                state.promote(transfer.from);
            }
        }

        state.accepted.push(transfer.clone());
        Ok(transfer.hash)
    }

    fn endpoint(&self) -> &str {
        &self.label
    }
}
