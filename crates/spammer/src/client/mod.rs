//! JSON-RPC client for an Ethereum-compatible endpoint.

mod types;

pub use types::{parse_quantity_u128, parse_quantity_u64, JsonRpcErrorObject};

use async_trait::async_trait;
use ethbench_types::{Address, Hash, LedgerClient, LedgerError, SignedTransfer, Wei};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;
use types::{JsonRpcRequest, JsonRpcResponse};

/// HTTP JSON-RPC client bound to a single endpoint.
pub struct RpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client for `url` with a per-request `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(RpcError::Http)?;

        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Perform one JSON-RPC call and return its `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        trace!(url = %self.url, method, id, "JSON-RPC request");

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(RpcError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }

        let body: JsonRpcResponse = response.json().await.map_err(RpcError::Http)?;
        if let Some(error) = body.error {
            return Err(RpcError::JsonRpc {
                code: error.code,
                message: error.message,
            });
        }
        body.result
            .ok_or_else(|| RpcError::InvalidResponse(format!("{} returned no result", method)))
    }

    async fn call_str(&self, method: &str, params: Value) -> Result<String, RpcError> {
        match self.call(method, params).await? {
            Value::String(s) => Ok(s),
            other => Err(RpcError::InvalidResponse(format!(
                "{} returned non-string result: {}",
                method, other
            ))),
        }
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").field("url", &self.url).finish()
    }
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn get_balance(&self, address: Address) -> Result<Wei, LedgerError> {
        let raw = self
            .call_str("eth_getBalance", json!([address.to_hex(), "latest"]))
            .await?;
        parse_quantity_u128(&raw)
            .map(Wei)
            .ok_or_else(|| LedgerError::InvalidResponse(format!("bad balance quantity {}", raw)))
    }

    async fn get_pending_nonce(&self, address: Address) -> Result<u64, LedgerError> {
        let raw = self
            .call_str(
                "eth_getTransactionCount",
                json!([address.to_hex(), "pending"]),
            )
            .await?;
        parse_quantity_u64(&raw)
            .ok_or_else(|| LedgerError::InvalidResponse(format!("bad nonce quantity {}", raw)))
    }

    async fn submit(&self, transfer: &SignedTransfer) -> Result<Hash, LedgerError> {
        let raw = self
            .call_str("eth_sendRawTransaction", json!([transfer.raw_hex()]))
            .await?;
        Hash::from_hex(&raw)
            .map_err(|e| LedgerError::InvalidResponse(format!("bad transaction hash {}: {}", raw, e)))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// RPC client errors.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<RpcError> for LedgerError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::JsonRpc { code, message } => LedgerError::Rejected { code, message },
            RpcError::InvalidResponse(message) => LedgerError::InvalidResponse(message),
            other => LedgerError::Transport(other.to_string()),
        }
    }
}
