//! TON chain adapter.
//!
//! Unlike the USDC-quoted Solana and EVM families, TON sizing is done in
//! native TON: balances come from a toncenter-style JSON-RPC endpoint in
//! nanotons, prices and swaps from the gateway in TON terms.

pub mod gateway;

use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::Signer as _;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::domain::position::Position;
use crate::domain::signal::{ChainFamily, Side};
use crate::ports::chain::{AdapterError, ChainAdapter, ExitFill, OrderFill};
use crate::vault::ChainSigner;

use super::{with_backoff, RetryPolicy};
use gateway::TonGateway;

const NANOTONS_PER_TON: f64 = 1_000_000_000.0;
const NATIVE_ASSET: &str = "TON";

#[derive(Debug, Clone)]
pub struct TonSettings {
    pub rpc_url: String,
    pub gateway_url: String,
    pub min_trade_size: f64,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

pub struct TonAdapter {
    http: Client,
    rpc_url: String,
    gateway: TonGateway,
    min_trade_size: f64,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<String>,
    error: Option<String>,
}

impl TonAdapter {
    pub fn new(settings: TonSettings) -> Result<Self, AdapterError> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| AdapterError::Network(format!("http client: {e}")))?;
        Ok(Self {
            http,
            rpc_url: settings.rpc_url,
            gateway: TonGateway::new(settings.gateway_url, settings.request_timeout)?,
            min_trade_size: settings.min_trade_size,
            retry: settings.retry,
        })
    }

    /// Native balance of a wallet contract, in TON.
    async fn native_balance(&self, address: &str) -> Result<f64, AdapterError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getAddressBalance",
            "params": { "address": address },
        });
        let envelope: RpcEnvelope = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Network(format!("getAddressBalance: {e}")))?
            .json()
            .await
            .map_err(|e| AdapterError::Network(format!("getAddressBalance: {e}")))?;
        if let Some(err) = envelope.error {
            return Err(AdapterError::Network(format!("getAddressBalance: {err}")));
        }
        let nanotons: u64 = envelope
            .result
            .ok_or_else(|| AdapterError::Network("getAddressBalance: empty result".into()))?
            .parse()
            .map_err(|e| AdapterError::Network(format!("getAddressBalance: bad amount: {e}")))?;
        Ok(nanotons as f64 / NANOTONS_PER_TON)
    }

    /// Build, sign and submit one swap. The gateway payload is signed with
    /// the scoped ed25519 key and never resubmitted.
    async fn swap(
        &self,
        signer: &ChainSigner,
        offer_asset: &str,
        ask_asset: &str,
        amount: f64,
        slippage_bps: u16,
    ) -> Result<(String, f64), AdapterError> {
        let key = signer
            .as_ton()
            .map_err(|e| AdapterError::Signature(e.to_string()))?;
        let public_key = hex::encode(key.verifying_key().to_bytes());

        let build = with_backoff(self.retry, "ton_swap_build", || {
            self.gateway
                .build_swap(&public_key, offer_asset, ask_asset, amount, slippage_bps)
        })
        .await?;

        use base64::Engine as _;
        let payload_bytes = base64::engine::general_purpose::STANDARD
            .decode(&build.payload)
            .map_err(|e| AdapterError::Order(format!("swap payload decode: {e}")))?;
        let signature = hex::encode(key.sign(&payload_bytes).to_bytes());

        let tx_id = self
            .gateway
            .submit_swap(&build.payload, &signature, &public_key)
            .await?;
        Ok((tx_id, build.expected_out))
    }
}

#[async_trait]
impl ChainAdapter for TonAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Ton
    }

    fn min_trade_size(&self) -> f64 {
        self.min_trade_size
    }

    async fn available_balance(&self, wallet: &str) -> Result<f64, AdapterError> {
        // Wallets are stored as raw public keys; the gateway maps them to
        // the deployed wallet contract.
        let address = with_backoff(self.retry, "ton_wallet", || {
            self.gateway.resolve_wallet(wallet)
        })
        .await?;
        with_backoff(self.retry, "ton_balance", || self.native_balance(&address)).await
    }

    async fn spot_price(&self, asset: &str) -> Result<f64, AdapterError> {
        with_backoff(self.retry, "ton_price", || self.gateway.get_price(asset)).await
    }

    async fn submit_order(
        &self,
        signer: &ChainSigner,
        asset: &str,
        side: Side,
        size: f64,
        slippage_bps: u16,
    ) -> Result<OrderFill, AdapterError> {
        if side != Side::Buy {
            return Err(AdapterError::Order("only buy entries are routed".into()));
        }
        let (tx_id, executed_quantity) = self
            .swap(signer, NATIVE_ASSET, asset, size, slippage_bps)
            .await?;
        if executed_quantity <= 0.0 {
            return Err(AdapterError::Order("gateway returned zero out amount".into()));
        }
        Ok(OrderFill {
            tx_id,
            executed_price: size / executed_quantity,
            executed_quantity,
        })
    }

    async fn submit_exit(
        &self,
        signer: &ChainSigner,
        position: &Position,
        slippage_bps: u16,
    ) -> Result<ExitFill, AdapterError> {
        let (tx_id, proceeds) = self
            .swap(
                signer,
                &position.asset,
                NATIVE_ASSET,
                position.quantity,
                slippage_bps,
            )
            .await?;
        Ok(ExitFill {
            tx_id,
            executed_price: proceeds / position.quantity,
        })
    }
}
