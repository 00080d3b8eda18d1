//! EVM swap aggregator HTTP client (1inch-compatible API surface).
//!
//! Amounts cross the wire as decimal strings in base units. 18-decimal
//! tokens overflow u64, so conversion goes through u128/f64 helpers here.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::ports::chain::AdapterError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub dst_amount: String,
}

/// Pre-built swap calldata, ready to wrap in a transaction and sign.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapBuild {
    pub dst_amount: String,
    pub tx: SwapTx,
}

#[derive(Debug, Deserialize)]
pub struct SwapTx {
    pub to: String,
    pub data: String,
    /// Native value in wei, decimal string.
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct AggregatorClient {
    http: Client,
    api_url: String,
}

impl AggregatorClient {
    pub fn new(api_url: String, timeout: Duration) -> Result<Self, AdapterError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Network(format!("http client: {e}")))?;
        Ok(Self { http, api_url })
    }

    pub async fn get_quote(
        &self,
        src: &str,
        dst: &str,
        amount: &str,
    ) -> Result<QuoteResponse, AdapterError> {
        let url = format!("{}/quote", self.api_url);
        let response = self
            .http
            .get(&url)
            .query(&[("src", src), ("dst", dst), ("amount", amount)])
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("quote: {e}")))?;
        read_json(response, "quote").await
    }

    pub async fn build_swap(
        &self,
        src: &str,
        dst: &str,
        amount: &str,
        from: &str,
        slippage_bps: u16,
    ) -> Result<SwapBuild, AdapterError> {
        let url = format!("{}/swap", self.api_url);
        // The API takes slippage as a percentage, not basis points.
        let slippage_pct = f64::from(slippage_bps) / 100.0;
        let response = self
            .http
            .get(&url)
            .query(&[
                ("src", src),
                ("dst", dst),
                ("amount", amount),
                ("from", from),
                ("slippage", &slippage_pct.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("swap: {e}")))?;
        read_json(response, "swap").await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T, AdapterError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_failure(what, status, &body));
    }
    response
        .json()
        .await
        .map_err(|e| AdapterError::Network(format!("{what}: {e}")))
}

fn classify_failure(what: &str, status: StatusCode, body: &str) -> AdapterError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return AdapterError::Network(format!("{what}: http {status}"));
    }
    let lowered = body.to_ascii_lowercase();
    if lowered.contains("liquidity") || lowered.contains("cannot swap") {
        return AdapterError::InsufficientLiquidity(format!("{what}: {body}"));
    }
    if lowered.contains("slippage") || lowered.contains("return amount") {
        return AdapterError::SlippageExceeded;
    }
    AdapterError::Order(format!("{what}: http {status}: {body}"))
}

/// `amount` in UI units to a base-unit decimal string.
pub fn to_base_units(amount: f64, decimals: u8) -> String {
    let scaled = amount * 10f64.powi(decimals as i32);
    format!("{}", scaled.round() as u128)
}

/// Base-unit decimal string back to UI units.
pub fn from_base_units(amount: &str, decimals: u8) -> Result<f64, AdapterError> {
    let raw: f64 = amount
        .parse()
        .map_err(|e| AdapterError::Order(format!("bad base-unit amount {amount}: {e}")))?;
    Ok(raw / 10f64.powi(decimals as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_base_units_survive_18_decimals() {
        let s = to_base_units(1500.0, 18);
        assert_eq!(s, "1500000000000000000000");
        assert_relative_eq!(from_base_units(&s, 18).unwrap(), 1500.0);
    }

    #[test]
    fn test_classify_liquidity_failure() {
        let err = classify_failure("quote", StatusCode::BAD_REQUEST, "insufficient liquidity");
        assert!(matches!(err, AdapterError::InsufficientLiquidity(_)));
    }

    #[test]
    fn test_server_error_is_transient() {
        assert!(classify_failure("swap", StatusCode::BAD_GATEWAY, "").is_transient());
    }
}
