//! Funding tests against the in-memory ledger.

use ethbench_ledger_memory::MemoryLedger;
use ethbench_spammer::{AccountFunder, AccountPool, FundingError, NonceAllocator, SpammerConfig};
use ethbench_types::{LegacyTransferSigner, Secp256k1KeyProvider, SigningKey, Wei};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    ledger: Arc<MemoryLedger>,
    funder: AccountFunder,
    config: SpammerConfig,
}

fn harness() -> Harness {
    let config = SpammerConfig::new(vec!["mem".into()], SigningKey::random(), 1337)
        .with_settlement_delay(Duration::from_millis(5));
    let ledger = Arc::new(MemoryLedger::new("mem"));
    let funder = AccountFunder::new(
        &config,
        ledger.clone(),
        Arc::new(LegacyTransferSigner::new(1337)),
        Arc::new(NonceAllocator::new()),
    );
    Harness {
        ledger,
        funder,
        config,
    }
}

/// Every account ends up with a non-zero balance.
#[tokio::test]
async fn test_all_accounts_funded() {
    let h = harness();
    h.ledger.credit(h.funder.parent(), Wei::from_ether(1_000));
    let pool = AccountPool::generate(5, &Secp256k1KeyProvider);

    let report = h.funder.fund(&pool).await.unwrap();

    assert_eq!(report.funded, 5);
    assert!(report.topped_up.is_empty());
    assert_eq!(report.total_sent, Wei::from_ether(5));
    for address in pool.addresses() {
        assert!(!h.ledger.balance_of(address).is_zero());
        assert_eq!(h.ledger.accepted_count_to(address), 1);
    }
    assert_eq!(h.ledger.pending_nonce_of(h.funder.parent()), 5);
}

/// An account whose funding never lands gets exactly one top-up.
#[tokio::test]
async fn test_straggler_gets_single_top_up() {
    let h = harness();
    h.ledger.credit(h.funder.parent(), Wei::from_ether(1_000));
    let pool = AccountPool::generate(4, &Secp256k1KeyProvider);
    let straggler = pool.addresses()[2];
    h.ledger.swallow_next_credit_to(straggler, 1);

    let report = h.funder.fund(&pool).await.unwrap();

    assert_eq!(report.topped_up, vec![straggler]);
    assert_eq!(h.ledger.accepted_count_to(straggler), 2);
    assert_eq!(h.ledger.balance_of(straggler), h.config.top_up_amount);
    for address in pool.addresses() {
        assert!(!h.ledger.balance_of(address).is_zero());
        if address != straggler {
            assert_eq!(h.ledger.accepted_count_to(address), 1);
        }
    }
}

/// A straggler that is still empty after its top-up aborts funding.
#[tokio::test]
async fn test_permanent_straggler_is_fatal() {
    let h = harness();
    h.ledger.credit(h.funder.parent(), Wei::from_ether(1_000));
    let pool = AccountPool::generate(3, &Secp256k1KeyProvider);
    let straggler = pool.addresses()[0];
    h.ledger.swallow_next_credit_to(straggler, 2);

    let err = h.funder.fund(&pool).await.unwrap_err();

    assert!(matches!(err, FundingError::AccountUnfunded(address) if address == straggler));
    assert_eq!(h.ledger.accepted_count_to(straggler), 2);
}

/// Funding never starts from an empty parent.
#[tokio::test]
async fn test_unfunded_parent_aborts() {
    let h = harness();
    let pool = AccountPool::generate(3, &Secp256k1KeyProvider);

    let err = h.funder.fund(&pool).await.unwrap_err();

    assert!(matches!(err, FundingError::ParentUnfunded(address) if address == h.funder.parent()));
    assert!(h.ledger.accepted().is_empty());
}

/// Balance query failures during verification are fatal.
#[tokio::test]
async fn test_balance_query_failure_is_fatal() {
    let h = harness();
    h.ledger.set_fail_balance_queries(true);
    let pool = AccountPool::generate(2, &Secp256k1KeyProvider);

    let err = h.funder.fund(&pool).await.unwrap_err();
    assert!(matches!(err, FundingError::BalanceQuery { .. }));
}

/// Funding two pools keeps the parent's nonces contiguous.
#[tokio::test]
async fn test_parent_nonces_contiguous_across_pools() {
    let h = harness();
    h.ledger.credit(h.funder.parent(), Wei::from_ether(1_000));
    let first = AccountPool::generate(3, &Secp256k1KeyProvider);
    let second = AccountPool::generate(2, &Secp256k1KeyProvider);

    h.funder.fund(&first).await.unwrap();
    h.funder.fund(&second).await.unwrap();

    let nonces: Vec<u64> = h
        .ledger
        .accepted()
        .iter()
        .filter(|tx| tx.from == h.funder.parent())
        .map(|tx| tx.nonce)
        .collect();
    assert_eq!(nonces, vec![0, 1, 2, 3, 4]);
    assert_eq!(h.ledger.queued_count(h.funder.parent()), 0);
}
