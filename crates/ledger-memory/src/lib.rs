//! # In-Memory Ledger
//!
//! Deterministic [`LedgerClient`](ethbench_types::LedgerClient) backend for
//! testing the spammer without a live endpoint.
//!
//! Models the parts of an account-based ledger that the spammer depends on:
//! balances, strict per-sender sequence ordering with a future-nonce queue,
//! and a pending-nonce query. Faults can be injected per sender or recipient
//! to exercise reset and top-up paths.

mod ledger;

pub use ledger::{Faults, MemoryLedger};
