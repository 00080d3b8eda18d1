//! TON swap gateway HTTP client.
//!
//! The gateway resolves wallet contracts from raw ed25519 public keys,
//! quotes jetton prices in TON and builds unsigned swap payloads. The
//! adapter signs the payload locally and posts the signature back.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::ports::chain::AdapterError;

#[derive(Debug, Deserialize)]
struct WalletResponse {
    address: String,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: f64,
}

#[derive(Debug, Serialize)]
struct BuildRequest<'a> {
    public_key: &'a str,
    offer_asset: &'a str,
    ask_asset: &'a str,
    /// UI units of the offered asset.
    amount: f64,
    slippage_bps: u16,
}

#[derive(Debug, Deserialize)]
pub struct SwapPayload {
    /// Base64 BoC to sign.
    pub payload: String,
    /// Expected proceeds in UI units of the asked asset.
    pub expected_out: f64,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    payload: &'a str,
    /// Hex ed25519 signature over the decoded payload.
    signature: &'a str,
    public_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    tx_id: String,
}

#[derive(Debug, Clone)]
pub struct TonGateway {
    http: Client,
    api_url: String,
}

impl TonGateway {
    pub fn new(api_url: String, timeout: Duration) -> Result<Self, AdapterError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Network(format!("http client: {e}")))?;
        Ok(Self { http, api_url })
    }

    /// Wallet-contract address for a raw public key.
    pub async fn resolve_wallet(&self, public_key: &str) -> Result<String, AdapterError> {
        let url = format!("{}/wallet", self.api_url);
        let response = self
            .http
            .get(&url)
            .query(&[("public_key", public_key)])
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("wallet: {e}")))?;
        let parsed: WalletResponse = read_json(response, "wallet").await?;
        Ok(parsed.address)
    }

    /// Spot price of a jetton in TON.
    pub async fn get_price(&self, asset: &str) -> Result<f64, AdapterError> {
        let url = format!("{}/price", self.api_url);
        let response = self
            .http
            .get(&url)
            .query(&[("asset", asset)])
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("price: {e}")))?;
        let parsed: PriceResponse = read_json(response, "price").await?;
        Ok(parsed.price)
    }

    pub async fn build_swap(
        &self,
        public_key: &str,
        offer_asset: &str,
        ask_asset: &str,
        amount: f64,
        slippage_bps: u16,
    ) -> Result<SwapPayload, AdapterError> {
        let url = format!("{}/swap/build", self.api_url);
        let response = self
            .http
            .post(&url)
            .json(&BuildRequest {
                public_key,
                offer_asset,
                ask_asset,
                amount,
                slippage_bps,
            })
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("swap build: {e}")))?;
        read_json(response, "swap build").await
    }

    pub async fn submit_swap(
        &self,
        payload: &str,
        signature: &str,
        public_key: &str,
    ) -> Result<String, AdapterError> {
        let url = format!("{}/swap/submit", self.api_url);
        let response = self
            .http
            .post(&url)
            .json(&SubmitRequest {
                payload,
                signature,
                public_key,
            })
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("swap submit: {e}")))?;
        let parsed: SubmitResponse = read_json(response, "swap submit").await?;
        Ok(parsed.tx_id)
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
    if lowered.contains("liquidity") || lowered.contains("no pool") {
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
    fn test_classify_no_pool_as_liquidity() {
        let err = classify_failure("swap build", StatusCode::BAD_REQUEST, "no pool for pair");
        assert!(matches!(err, AdapterError::InsufficientLiquidity(_)));
    }

    #[test]
    fn test_rate_limit_is_transient() {
        assert!(classify_failure("price", StatusCode::TOO_MANY_REQUESTS, "").is_transient());
    }
}
