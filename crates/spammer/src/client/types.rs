//! Types for JSON-RPC communication.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

/// Error object carried by a failed JSON-RPC call.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Parse a `0x`-prefixed hex quantity into a `u128`.
///
/// Values wider than 128 bits saturate to `u128::MAX`; a test network's
/// parent can legitimately hold more than that.
pub fn parse_quantity_u128(value: &str) -> Option<u128> {
    let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let significant = digits.trim_start_matches('0');
    if significant.len() > 32 {
        return Some(u128::MAX);
    }
    if significant.is_empty() {
        return Some(0);
    }
    u128::from_str_radix(significant, 16).ok()
}

/// Parse a `0x`-prefixed hex quantity into a `u64`. Overflow is an error.
pub fn parse_quantity_u64(value: &str) -> Option<u64> {
    let wide = parse_quantity_u128(value)?;
    if wide == u128::MAX {
        return None;
    }
    u64::try_from(wide).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity_u128("0x0"), Some(0));
        assert_eq!(parse_quantity_u128("0x1bc16d674ec80000"), Some(2_000_000_000_000_000_000));
        assert_eq!(parse_quantity_u128("0x00ff"), Some(255));
        assert_eq!(parse_quantity_u128("ff"), None);
        assert_eq!(parse_quantity_u128("0x"), None);
        assert_eq!(parse_quantity_u128("0xzz"), None);
    }

    #[test]
    fn test_balance_saturates() {
        let huge = format!("0x1{}", "0".repeat(40));
        assert_eq!(parse_quantity_u128(&huge), Some(u128::MAX));
    }

    #[test]
    fn test_nonce_overflow_rejected() {
        assert_eq!(parse_quantity_u64("0x2a"), Some(42));
        assert_eq!(parse_quantity_u64("0x10000000000000000"), None);
    }

    #[test]
    fn test_response_with_error_object() {
        let response: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low"}}"#,
        )
        .unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, -32000);
        assert_eq!(error.message, "nonce too low");
        assert!(response.result.is_none());
    }
}
