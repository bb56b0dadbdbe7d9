//! Per-sender sequence (nonce) allocation.
//!
//! A single [`NonceAllocator`] is created by the spammer and shared by every
//! worker in the process. It is the only source of sequence numbers: the
//! funder uses it for the parent account and the transfer workers use it for
//! pool accounts.
//!
//! # Seeding convention
//!
//! The ledger's pending nonce is the next *unused* value. The first allocation
//! for a sender returns that value unchanged, and the k-th allocation after a
//! seed `s` returns `s + k`. After [`NonceAllocator::reset`] the next
//! allocation again returns the freshly queried value.
//!
//! # Locking
//!
//! One async mutex guards the whole map and is held across the authoritative
//! query, so seeding, incrementing and resetting are each a single atomic
//! read-modify-write. Uniqueness matters more than allocation throughput here.
//!
//! Numbers are handed out before submission. A worker that fails to sign
//! after allocating leaves a gap the ledger will never fill; the next failed
//! submission from that sender resynchronizes it through `reset`.

use ethbench_types::{Address, LedgerClient, LedgerError};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Process-wide map from sender to the next sequence number to hand out.
#[derive(Debug, Default)]
pub struct NonceAllocator {
    next: Mutex<HashMap<Address, u64>>,
}

impl NonceAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number for `sender`.
    ///
    /// The first allocation for a sender seeds from `ledger`'s pending nonce.
    /// Query failures propagate and leave the map untouched.
    pub async fn allocate(
        &self,
        sender: Address,
        ledger: &dyn LedgerClient,
    ) -> Result<u64, LedgerError> {
        let mut next = self.next.lock().await;

        let nonce = match next.get(&sender) {
            Some(&nonce) => nonce,
            None => {
                let seed = ledger.get_pending_nonce(sender).await?;
                debug!(%sender, seed, endpoint = ledger.endpoint(), "Seeded sender nonce");
                seed
            }
        };

        next.insert(sender, nonce.saturating_add(1));
        Ok(nonce)
    }

    /// Resynchronize `sender` with the ledger's pending nonce, discarding any
    /// locally advanced value. Returns the value the next allocation will use.
    ///
    /// If the query fails the sender's entry is dropped, so the next
    /// allocation re-seeds instead of continuing from stale local state.
    pub async fn reset(
        &self,
        sender: Address,
        ledger: &dyn LedgerClient,
    ) -> Result<u64, LedgerError> {
        let mut next = self.next.lock().await;

        match ledger.get_pending_nonce(sender).await {
            Ok(authoritative) => {
                let previous = next.insert(sender, authoritative);
                debug!(
                    %sender,
                    authoritative,
                    previous = ?previous,
                    "Reset sender nonce"
                );
                Ok(authoritative)
            }
            Err(e) => {
                next.remove(&sender);
                Err(e)
            }
        }
    }

    /// Next value that would be allocated for `sender`, if it has been seeded.
    pub async fn peek(&self, sender: Address) -> Option<u64> {
        self.next.lock().await.get(&sender).copied()
    }

    /// Number of senders with local sequence state.
    pub async fn tracked_senders(&self) -> usize {
        self.next.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethbench_ledger_memory::MemoryLedger;
    use ethbench_types::SigningKey;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    fn sender() -> Address {
        SigningKey::random().address()
    }

    #[tokio::test]
    async fn test_first_allocation_returns_seed() {
        let ledger = MemoryLedger::new("mem");
        let allocator = NonceAllocator::new();
        let s = sender();
        ledger.set_pending_nonce(s, 5);

        assert_eq!(allocator.allocate(s, &ledger).await.unwrap(), 5);
        assert_eq!(allocator.allocate(s, &ledger).await.unwrap(), 6);
        assert_eq!(allocator.allocate(s, &ledger).await.unwrap(), 7);
        assert_eq!(allocator.peek(s).await, Some(8));
        // Seeded once, never re-queried.
        assert_eq!(ledger.nonce_query_count(s), 1);
    }

    #[tokio::test]
    async fn test_zero_seed_is_a_real_value() {
        let ledger = MemoryLedger::new("mem");
        let allocator = NonceAllocator::new();
        let s = sender();

        assert_eq!(allocator.allocate(s, &ledger).await.unwrap(), 0);
        assert_eq!(allocator.allocate(s, &ledger).await.unwrap(), 1);
        assert_eq!(ledger.nonce_query_count(s), 1);
    }

    #[tokio::test]
    async fn test_reset_discards_local_advance() {
        let ledger = MemoryLedger::new("mem");
        let allocator = NonceAllocator::new();
        let s = sender();
        ledger.set_pending_nonce(s, 5);

        assert_eq!(allocator.allocate(s, &ledger).await.unwrap(), 5);
        assert_eq!(allocator.allocate(s, &ledger).await.unwrap(), 6);

        // The network accepted 5 but never saw 6.
        ledger.set_pending_nonce(s, 6);
        assert_eq!(allocator.reset(s, &ledger).await.unwrap(), 6);
        assert_eq!(allocator.allocate(s, &ledger).await.unwrap(), 6);
        assert_eq!(allocator.allocate(s, &ledger).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_seed_failure_propagates_without_state() {
        let ledger = MemoryLedger::new("mem");
        let allocator = NonceAllocator::new();
        let s = sender();
        ledger.set_fail_nonce_queries(true);

        assert!(allocator.allocate(s, &ledger).await.is_err());
        assert_eq!(allocator.peek(s).await, None);
        assert_eq!(allocator.tracked_senders().await, 0);
    }

    #[tokio::test]
    async fn test_failed_reset_forces_reseed() {
        let ledger = MemoryLedger::new("mem");
        let allocator = NonceAllocator::new();
        let s = sender();
        ledger.set_pending_nonce(s, 3);
        allocator.allocate(s, &ledger).await.unwrap();

        ledger.set_fail_nonce_queries(true);
        assert!(allocator.reset(s, &ledger).await.is_err());
        assert_eq!(allocator.peek(s).await, None);

        ledger.set_fail_nonce_queries(false);
        ledger.set_pending_nonce(s, 4);
        assert_eq!(allocator.allocate(s, &ledger).await.unwrap(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocations_are_unique() {
        // Latency widens the window in which a racy allocator would double-seed.
        let ledger = Arc::new(MemoryLedger::new("mem").with_latency(Duration::from_millis(2)));
        let allocator = Arc::new(NonceAllocator::new());
        let s = sender();
        ledger.set_pending_nonce(s, 100);

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let allocator = Arc::clone(&allocator);
                tokio::spawn(async move { allocator.allocate(s, ledger.as_ref()).await.unwrap() })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            assert!(seen.insert(handle.await.unwrap()), "duplicate nonce issued");
        }

        let expected: HashSet<u64> = (100..164).collect();
        assert_eq!(seen, expected);
        assert_eq!(ledger.nonce_query_count(s), 1);
    }

    #[tokio::test]
    async fn test_senders_are_independent() {
        let ledger = MemoryLedger::new("mem");
        let allocator = NonceAllocator::new();
        let (a, b) = (sender(), sender());
        ledger.set_pending_nonce(b, 10);

        assert_eq!(allocator.allocate(a, &ledger).await.unwrap(), 0);
        assert_eq!(allocator.allocate(b, &ledger).await.unwrap(), 10);
        assert_eq!(allocator.allocate(a, &ledger).await.unwrap(), 1);
        assert_eq!(allocator.tracked_senders().await, 2);
    }
}
