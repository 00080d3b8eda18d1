//! Minimal Solana JSON-RPC client over HTTP.
//!
//! Only the calls the adapter needs: SPL token balances, mint decimals and
//! raw transaction submission.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ports::chain::AdapterError;

#[derive(Debug, Clone)]
pub struct SolanaRpc {
    http: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    account: ParsedAccount,
}

#[derive(Debug, Deserialize)]
struct ParsedAccount {
    data: ParsedData,
}

#[derive(Debug, Deserialize)]
struct ParsedData {
    parsed: ParsedInfo,
}

#[derive(Debug, Deserialize)]
struct ParsedInfo {
    info: TokenAccountInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountInfo {
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAmount {
    ui_amount: Option<f64>,
    decimals: u8,
}

impl SolanaRpc {
    pub fn new(url: String, timeout: Duration) -> Result<Self, AdapterError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Network(format!("http client: {e}")))?;
        Ok(Self { http, url })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, AdapterError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let envelope: RpcEnvelope<T> = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("{method}: {e}")))?
            .json()
            .await
            .map_err(|e| AdapterError::Network(format!("{method}: {e}")))?;
        if let Some(err) = envelope.error {
            return Err(AdapterError::Network(format!(
                "{method}: rpc error {}: {}",
                err.code, err.message
            )));
        }
        envelope
            .result
            .ok_or_else(|| AdapterError::Network(format!("{method}: empty result")))
    }

    /// Total SPL balance of `mint` held by `owner`, in UI units.
    pub async fn token_balance(&self, owner: &str, mint: &str) -> Result<f64, AdapterError> {
        let result: WithValue<Vec<KeyedAccount>> = self
            .call(
                "getTokenAccountsByOwner",
                json!([owner, { "mint": mint }, { "encoding": "jsonParsed" }]),
            )
            .await?;
        Ok(result
            .value
            .iter()
            .filter_map(|a| a.account.data.parsed.info.token_amount.ui_amount)
            .sum())
    }

    pub async fn token_decimals(&self, mint: &str) -> Result<u8, AdapterError> {
        let result: WithValue<TokenAmount> =
            self.call("getTokenSupply", json!([mint])).await?;
        Ok(result.value.decimals)
    }

    /// Submit a base64-encoded signed transaction. RPC-level rejections are
    /// terminal: a signed transaction must not be blindly resubmitted.
    pub async fn send_transaction(&self, tx_base64: &str) -> Result<String, AdapterError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendTransaction",
            "params": [tx_base64, { "encoding": "base64" }],
        });
        let envelope: RpcEnvelope<String> = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("sendTransaction: {e}")))?
            .json()
            .await
            .map_err(|e| AdapterError::Network(format!("sendTransaction: {e}")))?;
        if let Some(err) = envelope.error {
            return Err(AdapterError::Order(format!(
                "sendTransaction rejected ({}): {}",
                err.code, err.message
            )));
        }
        envelope
            .result
            .ok_or_else(|| AdapterError::Order("sendTransaction: empty result".into()))
    }
}
