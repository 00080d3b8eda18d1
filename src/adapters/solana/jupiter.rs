//! Jupiter aggregator HTTP client: quote, swap build, spot price.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ports::chain::AdapterError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// Amount of input token in base units.
    pub amount: u64,
    /// Slippage tolerance in basis points (1 = 0.01%).
    pub slippage_bps: u16,
}

/// Parsed quote plus the raw response, which the swap endpoint wants back
/// verbatim.
#[derive(Debug, Clone)]
pub struct Quote {
    pub out_amount: u64,
    pub raw: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    user_public_key: &'a str,
    quote_response: &'a Value,
    dynamic_compute_unit_limit: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    /// Base64 serialized transaction, ready to sign and send.
    pub swap_transaction: String,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    data: std::collections::HashMap<String, PriceEntry>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    price: f64,
}

#[derive(Debug, Clone)]
pub struct JupiterClient {
    http: Client,
    api_url: String,
    price_url: String,
}

impl JupiterClient {
    pub fn new(api_url: String, price_url: String, timeout: Duration) -> Result<Self, AdapterError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Network(format!("http client: {e}")))?;
        Ok(Self {
            http,
            api_url,
            price_url,
        })
    }

    pub async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, AdapterError> {
        let url = format!("{}/quote", self.api_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("inputMint", request.input_mint.as_str()),
                ("outputMint", request.output_mint.as_str()),
                ("amount", &request.amount.to_string()),
                ("slippageBps", &request.slippage_bps.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("quote: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure("quote", status, &body));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::Network(format!("quote: {e}")))?;
        let out_amount = raw
            .get("outAmount")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| AdapterError::Order("quote: missing outAmount".into()))?;
        Ok(Quote { out_amount, raw })
    }

    pub async fn build_swap(
        &self,
        user_public_key: &str,
        quote: &Quote,
    ) -> Result<SwapResponse, AdapterError> {
        let url = format!("{}/swap", self.api_url);
        let response = self
            .http
            .post(&url)
            .json(&SwapRequest {
                user_public_key,
                quote_response: &quote.raw,
                dynamic_compute_unit_limit: true,
            })
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("swap: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure("swap", status, &body));
        }
        response
            .json()
            .await
            .map_err(|e| AdapterError::Network(format!("swap: {e}")))
    }

    /// Spot USD price for a mint from the Jupiter price API.
    pub async fn get_price(&self, mint: &str) -> Result<f64, AdapterError> {
        let url = format!("{}?ids={}", self.price_url, mint);
        let response: PriceResponse = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("price: {e}")))?
            .json()
            .await
            .map_err(|e| AdapterError::Network(format!("price: {e}")))?;
        response
            .data
            .get(mint)
            .map(|p| p.price)
            .ok_or_else(|| AdapterError::Network(format!("price: no data for {mint}")))
    }
}

/// Map an aggregator HTTP failure onto the adapter taxonomy. Rate limiting
/// and server-side trouble are transient; routing failures are liquidity.
fn classify_failure(what: &str, status: StatusCode, body: &str) -> AdapterError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return AdapterError::Network(format!("{what}: http {status}"));
    }
    let lowered = body.to_ascii_lowercase();
    if lowered.contains("route") || lowered.contains("liquidity") {
        return AdapterError::InsufficientLiquidity(format!("{what}: {body}"));
    }
    if lowered.contains("slippage") {
        return AdapterError::SlippageExceeded;
    }
    AdapterError::Order(format!("{what}: http {status}: {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_no_route_as_liquidity() {
        let err = classify_failure(
            "quote",
            StatusCode::BAD_REQUEST,
            "COULD_NOT_FIND_ANY_ROUTE",
        );
        assert!(matches!(err, AdapterError::InsufficientLiquidity(_)));
    }

    #[test]
    fn test_classify_rate_limit_as_transient() {
        let err = classify_failure("quote", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(err.is_transient());
    }

    #[test]
    fn test_classify_slippage() {
        let err = classify_failure("swap", StatusCode::BAD_REQUEST, "Slippage tolerance exceeded");
        assert!(matches!(err, AdapterError::SlippageExceeded));
    }
}
