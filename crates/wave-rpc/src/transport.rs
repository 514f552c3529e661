use alloy_primitives::hex;
use alloy_sol_types::{Revert, SolError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use wave_provider::{ProviderError, ProviderResult};

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

/// JSON-RPC 2.0 over HTTP.
///
/// Reads `WAVE_RPC_URL` from environment at construction time when no
/// endpoint is given (default: `http://localhost:8545`).
pub struct RpcTransport {
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl Default for RpcTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcErrorObject {
    pub(crate) fn into_provider_error(self) -> ProviderError {
        let revert_reason = self.data.as_ref().and_then(revert_reason_from_data);
        ProviderError::Rpc {
            code: self.code,
            message: self.message,
            revert_reason,
        }
    }
}

/// Decodes `Error(string)` revert data, which nodes attach either as a bare
/// hex string or nested under `data`.
fn revert_reason_from_data(data: &Value) -> Option<String> {
    let raw = match data {
        Value::String(raw) => raw.as_str(),
        Value::Object(map) => map.get("data")?.as_str()?,
        _ => return None,
    };

    let bytes = hex::decode(raw).ok()?;
    Revert::abi_decode(&bytes, true).ok().map(|revert| revert.reason)
}

impl RpcTransport {
    pub fn new(endpoint: Option<String>) -> Self {
        let endpoint = endpoint
            .or_else(|| std::env::var("WAVE_RPC_URL").ok())
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn request<P, R>(&self, method: &str, params: P) -> ProviderResult<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!("rpc {} #{}", method, id);
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Transport(format!("{method}: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ProviderError::Transport(format!("{method}: {err}")))?;

        if !status.is_success() {
            // Some nodes answer JSON-RPC errors with a non-2xx status.
            if let Ok(parsed) = serde_json::from_str::<RpcResponse>(&text) {
                if let Some(err) = parsed.error {
                    return Err(err.into_provider_error());
                }
            }
            return Err(ProviderError::Transport(format!(
                "{method}: HTTP {status}: {text}"
            )));
        }

        parse_response(method, &text)
    }
}

pub(crate) fn parse_response<R: DeserializeOwned>(method: &str, text: &str) -> ProviderResult<R> {
    let parsed: RpcResponse = serde_json::from_str(text)
        .map_err(|err| ProviderError::Decode(format!("{method}: {err}")))?;

    if let Some(err) = parsed.error {
        return Err(err.into_provider_error());
    }

    serde_json::from_value(parsed.result.unwrap_or(Value::Null))
        .map_err(|err| ProviderError::Decode(format!("{method}: {err}")))
}

/// Parses a JSON-RPC quantity (`"0x1a"`).
pub(crate) fn parse_quantity(raw: &str) -> ProviderResult<u64> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| ProviderError::Decode(format!("quantity without 0x prefix: {raw}")))?;
    if digits.is_empty() {
        return Err(ProviderError::Decode("empty quantity".to_owned()));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|err| ProviderError::Decode(format!("quantity {raw}: {err}")))
}

pub(crate) fn to_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave_provider::codes;

    #[test]
    fn parses_result_payload() {
        let accounts: Vec<String> = parse_response(
            "eth_accounts",
            r#"{"jsonrpc":"2.0","id":1,"result":["0xabc"]}"#,
        )
        .expect("result");
        assert_eq!(accounts, vec!["0xabc".to_owned()]);
    }

    #[test]
    fn null_result_is_none() {
        let receipt: Option<Value> = parse_response(
            "eth_getTransactionReceipt",
            r#"{"jsonrpc":"2.0","id":7,"result":null}"#,
        )
        .expect("null result");
        assert!(receipt.is_none());
    }

    #[test]
    fn maps_wallet_error_codes() {
        let err = parse_response::<Vec<String>>(
            "eth_requestAccounts",
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32002,"message":"Request of type 'wallet_requestPermissions' already pending"}}"#,
        )
        .expect_err("pending");
        assert!(err.is_request_pending());
    }

    #[test]
    fn decodes_abi_encoded_revert_data() {
        // Error(string) with reason "Wait 15m".
        let data = "0x08c379a0\
            0000000000000000000000000000000000000000000000000000000000000020\
            0000000000000000000000000000000000000000000000000000000000000008\
            576169742031356d000000000000000000000000000000000000000000000000";
        let body = format!(
            r#"{{"jsonrpc":"2.0","id":3,"error":{{"code":3,"message":"execution reverted","data":"{data}"}}}}"#
        );
        let err = parse_response::<String>("eth_sendTransaction", &body).expect_err("revert");
        assert_eq!(err.code(), Some(codes::EXECUTION_REVERTED));
        assert_eq!(err.revert_reason().as_deref(), Some("Wait 15m"));
    }

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0x1a").expect("hex"), 26);
        assert_eq!(parse_quantity("0x0").expect("zero"), 0);
        assert!(parse_quantity("26").is_err());
        assert!(parse_quantity("0x").is_err());
        assert_eq!(to_quantity(255), "0xff");
    }
}
