//! Ledger endpoint trait.
//!
//! Implemented by the JSON-RPC client (`ethbench-spammer`) and the in-memory
//! ledger used in tests (`ethbench-ledger-memory`). One handle per endpoint,
//! shared between all workers for that endpoint.

use crate::address::Address;
use crate::hash::Hash;
use crate::transaction::SignedTransfer;
use crate::wei::Wei;
use async_trait::async_trait;

/// Error returned by a ledger endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The endpoint could not be reached or returned a malformed response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The endpoint understood the request and refused it.
    #[error("Rejected by endpoint (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// The endpoint answered with a value that could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Authoritative ledger queries and submission.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current balance of `address`.
    async fn get_balance(&self, address: Address) -> Result<Wei, LedgerError>;

    /// Next sequence number the endpoint expects from `address`, counting
    /// transfers still pending in its pool.
    async fn get_pending_nonce(&self, address: Address) -> Result<u64, LedgerError>;

    /// Submit a signed transfer, returning its transaction hash.
    async fn submit(&self, transfer: &SignedTransfer) -> Result<Hash, LedgerError>;

    /// Human-readable endpoint label for logs.
    fn endpoint(&self) -> &str;
}
