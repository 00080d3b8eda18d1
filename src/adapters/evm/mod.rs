//! EVM chain adapter: USDC-quoted swaps through an aggregator router.
//!
//! Reads (balances, decimals, quotes) go straight to the RPC node or the
//! aggregator and are retried on transient failures. Writes are signed
//! locally with the scoped wallet and submitted exactly once.

pub mod aggregator;

use std::time::Duration;

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::Signer as _;
use ethers::types::{Address, Bytes, TransactionRequest, U256};

use crate::domain::position::Position;
use crate::domain::signal::{ChainFamily, Side};
use crate::ports::chain::{AdapterError, ChainAdapter, ExitFill, OrderFill};
use crate::vault::ChainSigner;

use super::{with_backoff, RetryPolicy};
use aggregator::{from_base_units, to_base_units, AggregatorClient};

const SELECTOR_BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];
const SELECTOR_DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
const SELECTOR_ALLOWANCE: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];
const SELECTOR_APPROVE: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

#[derive(Debug, Clone)]
pub struct EvmSettings {
    pub rpc_url: String,
    pub aggregator_url: String,
    /// Quote-currency token contract.
    pub usdc_address: String,
    /// Aggregator router that must hold an allowance on the input token.
    pub router_address: String,
    pub chain_id: u64,
    pub min_trade_size: f64,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

pub struct EvmAdapter {
    provider: Provider<Http>,
    aggregator: AggregatorClient,
    usdc_address: Address,
    router_address: Address,
    chain_id: u64,
    min_trade_size: f64,
    retry: RetryPolicy,
}

impl EvmAdapter {
    pub fn new(settings: EvmSettings) -> Result<Self, AdapterError> {
        let provider = Provider::<Http>::try_from(settings.rpc_url.as_str())
            .map_err(|e| AdapterError::Network(format!("rpc provider: {e}")))?;
        Ok(Self {
            provider,
            aggregator: AggregatorClient::new(settings.aggregator_url, settings.request_timeout)?,
            usdc_address: parse_address(&settings.usdc_address)?,
            router_address: parse_address(&settings.router_address)?,
            chain_id: settings.chain_id,
            min_trade_size: settings.min_trade_size,
            retry: settings.retry,
        })
    }

    async fn erc20_call(&self, token: Address, calldata: Vec<u8>) -> Result<Bytes, AdapterError> {
        let tx = TransactionRequest::new().to(token).data(calldata);
        with_backoff(self.retry, "eth_call", || {
            let tx = tx.clone();
            async move {
                self.provider
                    .call(&tx.into(), None)
                    .await
                    .map_err(|e| AdapterError::Network(format!("eth_call: {e}")))
            }
        })
        .await
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, AdapterError> {
        let out = self.erc20_call(token, SELECTOR_DECIMALS.to_vec()).await?;
        out.last()
            .copied()
            .ok_or_else(|| AdapterError::Order(format!("decimals() on {token:?}: empty return")))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, AdapterError> {
        let mut calldata = SELECTOR_BALANCE_OF.to_vec();
        calldata.extend_from_slice(&encode_address(owner));
        let out = self.erc20_call(token, calldata).await?;
        decode_u256(&out, "balanceOf")
    }

    /// Grant the router an allowance on `token` if the current one cannot
    /// cover `amount`. Approval mining is awaited so the swap that follows
    /// sees it.
    async fn ensure_allowance(
        &self,
        signer: &ethers::signers::LocalWallet,
        token: Address,
        amount: U256,
    ) -> Result<(), AdapterError> {
        let mut calldata = SELECTOR_ALLOWANCE.to_vec();
        calldata.extend_from_slice(&encode_address(signer.address()));
        calldata.extend_from_slice(&encode_address(self.router_address));
        let out = self.erc20_call(token, calldata).await?;
        if decode_u256(&out, "allowance")? >= amount {
            return Ok(());
        }

        tracing::info!(?token, "approving aggregator router allowance");
        let mut calldata = SELECTOR_APPROVE.to_vec();
        calldata.extend_from_slice(&encode_address(self.router_address));
        calldata.extend_from_slice(&[0xff; 32]);
        let tx = TransactionRequest::new().to(token).data(calldata);
        self.send_signed(signer, tx, "approve").await?;
        Ok(())
    }

    async fn send_signed(
        &self,
        signer: &ethers::signers::LocalWallet,
        tx: TransactionRequest,
        what: &str,
    ) -> Result<String, AdapterError> {
        let wallet = signer.clone().with_chain_id(self.chain_id);
        let client = SignerMiddleware::new(self.provider.clone(), wallet);
        let pending = client
            .send_transaction(tx, None)
            .await
            .map_err(|e| AdapterError::Order(format!("{what}: send failed: {e}")))?;
        let receipt = pending
            .await
            .map_err(|e| AdapterError::Network(format!("{what}: confirmation: {e}")))?
            .ok_or_else(|| AdapterError::Order(format!("{what}: transaction dropped")))?;
        if receipt.status != Some(1.into()) {
            return Err(AdapterError::Order(format!(
                "{what}: transaction {:?} reverted",
                receipt.transaction_hash
            )));
        }
        Ok(format!("{:?}", receipt.transaction_hash))
    }

    async fn swap(
        &self,
        signer: &ChainSigner,
        src: Address,
        dst: Address,
        amount_base: &str,
        slippage_bps: u16,
    ) -> Result<(String, String), AdapterError> {
        let wallet = signer
            .as_evm()
            .map_err(|e| AdapterError::Signature(e.to_string()))?;

        let amount = U256::from_dec_str(amount_base)
            .map_err(|e| AdapterError::Order(format!("bad amount {amount_base}: {e}")))?;
        self.ensure_allowance(wallet, src, amount).await?;

        let from = format!("{:?}", wallet.address());
        let src_token = format!("{src:?}");
        let dst_token = format!("{dst:?}");
        let build = with_backoff(self.retry, "aggregator_swap", || {
            self.aggregator
                .build_swap(&src_token, &dst_token, amount_base, &from, slippage_bps)
        })
        .await?;

        let to = parse_address(&build.tx.to)?;
        let data = hex::decode(build.tx.data.trim_start_matches("0x"))
            .map_err(|e| AdapterError::Order(format!("swap calldata decode: {e}")))?;
        let value = U256::from_dec_str(&build.tx.value)
            .map_err(|e| AdapterError::Order(format!("swap value decode: {e}")))?;
        let tx = TransactionRequest::new()
            .to(to)
            .data(Bytes::from(data))
            .value(value);

        let tx_id = self.send_signed(wallet, tx, "swap").await?;
        Ok((tx_id, build.dst_amount))
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn min_trade_size(&self) -> f64 {
        self.min_trade_size
    }

    async fn available_balance(&self, wallet: &str) -> Result<f64, AdapterError> {
        let owner = parse_address(wallet)?;
        let raw = self.token_balance(self.usdc_address, owner).await?;
        let decimals = self.token_decimals(self.usdc_address).await?;
        from_base_units(&raw.to_string(), decimals)
    }

    async fn spot_price(&self, asset: &str) -> Result<f64, AdapterError> {
        let token = parse_address(asset)?;
        let asset_decimals = self.token_decimals(token).await?;
        let usdc_decimals = self.token_decimals(self.usdc_address).await?;
        let one_token = to_base_units(1.0, asset_decimals);
        let src_token = format!("{token:?}");
        let dst_token = format!("{:?}", self.usdc_address);
        let quote = with_backoff(self.retry, "aggregator_quote", || {
            self.aggregator.get_quote(&src_token, &dst_token, &one_token)
        })
        .await?;
        from_base_units(&quote.dst_amount, usdc_decimals)
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
        let token = parse_address(asset)?;
        let usdc_decimals = self.token_decimals(self.usdc_address).await?;
        let asset_decimals = self.token_decimals(token).await?;

        let amount = to_base_units(size, usdc_decimals);
        let (tx_id, dst_amount) = self
            .swap(signer, self.usdc_address, token, &amount, slippage_bps)
            .await?;

        let executed_quantity = from_base_units(&dst_amount, asset_decimals)?;
        if executed_quantity <= 0.0 {
            return Err(AdapterError::Order("swap returned zero out amount".into()));
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
        let token = parse_address(&position.asset)?;
        let usdc_decimals = self.token_decimals(self.usdc_address).await?;
        let asset_decimals = self.token_decimals(token).await?;

        let amount = to_base_units(position.quantity, asset_decimals);
        let (tx_id, dst_amount) = self
            .swap(signer, token, self.usdc_address, &amount, slippage_bps)
            .await?;

        let proceeds = from_base_units(&dst_amount, usdc_decimals)?;
        Ok(ExitFill {
            tx_id,
            executed_price: proceeds / position.quantity,
        })
    }
}

fn parse_address(text: &str) -> Result<Address, AdapterError> {
    text.parse()
        .map_err(|e| AdapterError::Order(format!("bad address {text}: {e}")))
}

/// ABI-encode an address as a 32-byte word.
fn encode_address(address: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn decode_u256(out: &[u8], what: &str) -> Result<U256, AdapterError> {
    if out.len() < 32 {
        return Err(AdapterError::Order(format!(
            "{what}: short return ({} bytes)",
            out.len()
        )));
    }
    Ok(U256::from_big_endian(&out[..32]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_address_pads_left() {
        let addr: Address = "0x1111111254eeb25477b68fb85ed929f73a960582"
            .parse()
            .unwrap();
        let word = encode_address(addr);
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(&word[12..], addr.as_bytes());
    }

    #[test]
    fn test_decode_u256_rejects_short_return() {
        assert!(decode_u256(&[0u8; 4], "balanceOf").is_err());
        let mut word = [0u8; 32];
        word[31] = 7;
        assert_eq!(decode_u256(&word, "balanceOf").unwrap(), U256::from(7));
    }
}
