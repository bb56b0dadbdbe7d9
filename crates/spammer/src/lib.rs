//! Ethereum Transfer Load Generator
//!
//! A library and CLI tool for generating sustained value-transfer load
//! against one or more Ethereum JSON-RPC endpoints.
//!
//! # Modules
//!
//! - [`nonce`]: Process-wide per-sender nonce allocation (NonceAllocator)
//! - [`accounts`]: Account pools and parent funding (AccountPool, AccountFunder)
//! - [`workloads`]: Adjacent-pair transfer rounds (TransferScheduler)
//! - [`runner`]: Node loops and the spammer orchestrator
//! - [`client`]: JSON-RPC client implementing `LedgerClient`
//! - [`config`]: Configuration types

pub mod accounts;
pub mod client;
pub mod config;
pub mod nonce;
pub mod runner;
pub mod workloads;

pub use accounts::{AccountFunder, AccountPool, FundingError, FundingReport, SweepReport};
pub use client::{RpcClient, RpcError};
pub use config::{ConfigError, SpammerConfig};
pub use nonce::NonceAllocator;
pub use runner::{
    NodeReport, NodeRunner, Spammer, SpammerError, SpammerReport, SpammerStats, StatsSnapshot,
};
pub use workloads::{plan_round, TransferDirection, TransferScheduler, TransferTask};
