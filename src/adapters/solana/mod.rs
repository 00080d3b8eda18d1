//! Solana chain adapter: USDC-quoted swaps routed through Jupiter.
//!
//! Balances and decimals come from the Solana JSON-RPC node; quotes and
//! swap transactions from the Jupiter aggregator. Reads are retried with
//! backoff; a signed transaction is submitted exactly once.

pub mod jupiter;
pub mod rpc;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use solana_sdk::signer::Signer as _;
use solana_sdk::transaction::VersionedTransaction;

use crate::domain::position::Position;
use crate::domain::signal::{ChainFamily, Side};
use crate::ports::chain::{AdapterError, ChainAdapter, ExitFill, OrderFill};
use crate::vault::ChainSigner;

use super::{with_backoff, RetryPolicy};
use jupiter::{JupiterClient, Quote, QuoteRequest};
use rpc::SolanaRpc;

#[derive(Debug, Clone)]
pub struct SolanaSettings {
    pub rpc_url: String,
    pub jupiter_api_url: String,
    pub jupiter_price_url: String,
    /// Mint of the quote currency all sizing is done in.
    pub usdc_mint: String,
    pub min_trade_size: f64,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

pub struct SolanaAdapter {
    rpc: SolanaRpc,
    jupiter: JupiterClient,
    usdc_mint: String,
    min_trade_size: f64,
    retry: RetryPolicy,
}

impl SolanaAdapter {
    pub fn new(settings: SolanaSettings) -> Result<Self, AdapterError> {
        Ok(Self {
            rpc: SolanaRpc::new(settings.rpc_url, settings.request_timeout)?,
            jupiter: JupiterClient::new(
                settings.jupiter_api_url,
                settings.jupiter_price_url,
                settings.request_timeout,
            )?,
            usdc_mint: settings.usdc_mint,
            min_trade_size: settings.min_trade_size,
            retry: settings.retry,
        })
    }

    async fn decimals(&self, mint: &str) -> Result<u8, AdapterError> {
        with_backoff(self.retry, "token_decimals", || self.rpc.token_decimals(mint)).await
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, AdapterError> {
        with_backoff(self.retry, "jupiter_quote", || self.jupiter.get_quote(request)).await
    }

    /// Sign the aggregator-built transaction and submit it. No retry past
    /// this point.
    async fn sign_and_send(
        &self,
        keypair: &solana_sdk::signature::Keypair,
        swap_transaction_b64: &str,
    ) -> Result<String, AdapterError> {
        let tx_bytes = base64::engine::general_purpose::STANDARD
            .decode(swap_transaction_b64)
            .map_err(|e| AdapterError::Order(format!("swap transaction decode: {e}")))?;
        let mut tx: VersionedTransaction = bincode::deserialize(&tx_bytes)
            .map_err(|e| AdapterError::Order(format!("swap transaction deserialize: {e}")))?;

        let signature = keypair.sign_message(&tx.message.serialize());
        tx.signatures = vec![signature];

        let signed = bincode::serialize(&tx)
            .map_err(|e| AdapterError::Order(format!("swap transaction serialize: {e}")))?;
        self.rpc
            .send_transaction(&base64::engine::general_purpose::STANDARD.encode(signed))
            .await
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    fn min_trade_size(&self) -> f64 {
        self.min_trade_size
    }

    async fn available_balance(&self, wallet: &str) -> Result<f64, AdapterError> {
        with_backoff(self.retry, "token_balance", || {
            self.rpc.token_balance(wallet, &self.usdc_mint)
        })
        .await
    }

    async fn spot_price(&self, asset: &str) -> Result<f64, AdapterError> {
        with_backoff(self.retry, "jupiter_price", || self.jupiter.get_price(asset)).await
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
        let keypair = signer
            .as_solana()
            .map_err(|e| AdapterError::Signature(e.to_string()))?;

        let usdc_decimals = self.decimals(&self.usdc_mint).await?;
        let asset_decimals = self.decimals(asset).await?;
        let quote = self
            .quote(&QuoteRequest {
                input_mint: self.usdc_mint.clone(),
                output_mint: asset.to_string(),
                amount: to_base_units(size, usdc_decimals),
                slippage_bps,
            })
            .await?;

        let swap = self.jupiter.build_swap(&keypair.pubkey().to_string(), &quote).await?;
        let tx_id = self.sign_and_send(keypair, &swap.swap_transaction).await?;

        let executed_quantity = from_base_units(quote.out_amount, asset_decimals);
        if executed_quantity <= 0.0 {
            return Err(AdapterError::Order("quote returned zero out amount".into()));
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
        let keypair = signer
            .as_solana()
            .map_err(|e| AdapterError::Signature(e.to_string()))?;

        let usdc_decimals = self.decimals(&self.usdc_mint).await?;
        let asset_decimals = self.decimals(&position.asset).await?;
        let quote = self
            .quote(&QuoteRequest {
                input_mint: position.asset.clone(),
                output_mint: self.usdc_mint.clone(),
                amount: to_base_units(position.quantity, asset_decimals),
                slippage_bps,
            })
            .await?;

        let swap = self.jupiter.build_swap(&keypair.pubkey().to_string(), &quote).await?;
        let tx_id = self.sign_and_send(keypair, &swap.swap_transaction).await?;

        let proceeds = from_base_units(quote.out_amount, usdc_decimals);
        Ok(ExitFill {
            tx_id,
            executed_price: proceeds / position.quantity,
        })
    }
}

fn to_base_units(amount: f64, decimals: u8) -> u64 {
    (amount * 10f64.powi(decimals as i32)).round() as u64
}

fn from_base_units(amount: u64, decimals: u8) -> f64 {
    amount as f64 / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_base_unit_conversion() {
        assert_eq!(to_base_units(50.0, 6), 50_000_000);
        assert_eq!(to_base_units(0.5, 9), 500_000_000);
        assert_relative_eq!(from_base_units(50_000_000, 6), 50.0);
    }

    #[test]
    fn test_base_unit_round_trip_is_stable() {
        let amount = 123.456789;
        assert_relative_eq!(
            from_base_units(to_base_units(amount, 6), 6),
            amount,
            epsilon = 1e-6
        );
    }
}
