//! End-to-end spammer runs against the in-memory ledger.

use ethbench_ledger_memory::MemoryLedger;
use ethbench_spammer::{FundingError, Spammer, SpammerConfig, SpammerError};
use ethbench_types::{LedgerClient, LegacyTransferSigner, Secp256k1KeyProvider, SigningKey, Wei};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn test_config(nodes: usize) -> SpammerConfig {
    let endpoints = (0..nodes).map(|i| format!("mem-{}", i)).collect();
    SpammerConfig::new(endpoints, SigningKey::random(), 1337)
        .with_accounts_per_node(3)
        .with_settlement_delay(Duration::from_millis(2))
        .with_stagger_interval(Duration::from_millis(5))
        .with_round_interval_per_node(Duration::from_millis(10))
        .with_progress_interval(Duration::from_millis(20))
        .with_shutdown_grace(Duration::from_secs(5))
}

/// Every node handle talks to the same in-memory network.
fn spammer_over(ledger: &Arc<MemoryLedger>, config: SpammerConfig) -> Spammer {
    let clients: Vec<Arc<dyn LedgerClient>> = (0..config.node_count())
        .map(|_| ledger.clone() as Arc<dyn LedgerClient>)
        .collect();
    let signer = Arc::new(LegacyTransferSigner::new(config.chain_id));
    Spammer::with_backends(config, clients, Arc::new(Secp256k1KeyProvider), signer).unwrap()
}

#[tokio::test]
async fn test_run_funds_then_generates_load() {
    let ledger = Arc::new(MemoryLedger::new("mem"));
    let config = test_config(2);
    ledger.credit(config.parent_address(), Wei::from_ether(100));
    let mut spammer = spammer_over(&ledger, config);

    let report = spammer.run_for(Duration::from_millis(150)).await.unwrap();

    assert!(report.drained);
    assert_eq!(report.nodes.len(), 2);
    assert!(report.nodes.iter().all(|node| node.rounds >= 1));

    let launched: u64 = report.nodes.iter().map(|node| node.launched).sum();
    assert_eq!(report.counters.launched, launched);
    assert_eq!(report.counters.accepted, launched);
    assert_eq!(report.counters.failed, 0);

    // Two pools of three, funded from the parent, then pair transfers.
    assert_eq!(ledger.pending_nonce_of(spammer.parent_address()), 6);
    assert_eq!(ledger.accepted().len() as u64, 6 + launched);
    assert_eq!(spammer.pools().len(), 2);
    for pool in spammer.pools() {
        for address in pool.addresses() {
            assert!(!ledger.balance_of(address).is_zero());
        }
    }
}

#[tokio::test]
async fn test_unfunded_parent_stops_before_load() {
    let ledger = Arc::new(MemoryLedger::new("mem"));
    let mut spammer = spammer_over(&ledger, test_config(1));

    let err = spammer
        .run_until_cancelled(CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SpammerError::Funding(FundingError::ParentUnfunded(_))
    ));
    assert!(ledger.accepted().is_empty());
    assert!(spammer.pools().is_empty());
}

#[tokio::test]
async fn test_cancel_before_start() {
    let ledger = Arc::new(MemoryLedger::new("mem"));
    let config = test_config(1);
    ledger.credit(config.parent_address(), Wei::from_ether(100));
    let mut spammer = spammer_over(&ledger, config);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = spammer.run_until_cancelled(cancel).await.unwrap_err();

    assert!(matches!(err, SpammerError::Cancelled));
    assert!(ledger.accepted().is_empty());
}

#[tokio::test]
async fn test_sweep_on_stop_returns_funds() {
    let ledger = Arc::new(MemoryLedger::new("mem"));
    let config = test_config(1).with_sweep_on_stop(true);
    let reserve = config.sweep_reserve;
    ledger.credit(config.parent_address(), Wei::from_ether(100));
    let mut spammer = spammer_over(&ledger, config);

    spammer.prepare().await.unwrap();
    spammer.run_for(Duration::from_millis(50)).await.unwrap();

    for address in spammer.pools()[0].addresses() {
        assert_eq!(ledger.balance_of(address), reserve);
    }
    assert!(ledger.balance_of(spammer.parent_address()) > Wei::from_ether(99));
}

#[tokio::test]
async fn test_client_count_must_match_endpoints() {
    let ledger = Arc::new(MemoryLedger::new("mem"));
    let clients: Vec<Arc<dyn LedgerClient>> = vec![ledger];
    let result = Spammer::with_backends(
        test_config(2),
        clients,
        Arc::new(Secp256k1KeyProvider),
        Arc::new(LegacyTransferSigner::new(1337)),
    );

    assert!(matches!(
        result,
        Err(SpammerError::ClientMismatch {
            endpoints: 2,
            clients: 1
        })
    ));
}

#[test]
fn test_invalid_config_rejected() {
    let ledger = Arc::new(MemoryLedger::new("mem"));
    let clients: Vec<Arc<dyn LedgerClient>> = vec![ledger];
    let result = Spammer::with_backends(
        test_config(1).with_accounts_per_node(1),
        clients,
        Arc::new(Secp256k1KeyProvider),
        Arc::new(LegacyTransferSigner::new(1337)),
    );
    assert!(matches!(result, Err(SpammerError::Config(_))));
}
