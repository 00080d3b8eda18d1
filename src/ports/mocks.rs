//! Deterministic ChainAdapter double for unit and integration tests.
//!
//! Records every call and serves controlled responses; no network anywhere.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::position::Position;
use crate::domain::signal::{ChainFamily, Side};
use crate::vault::ChainSigner;

use super::chain::{AdapterError, ChainAdapter, ExitFill, OrderFill};

#[derive(Debug, Clone)]
pub struct SubmittedOrder {
    pub wallet: String,
    pub asset: String,
    pub side: Side,
    pub size: f64,
}

#[derive(Default)]
struct MockState {
    balances: HashMap<String, f64>,
    prices: HashMap<String, f64>,
    fail_submit: Option<AdapterError>,
    fail_exit: Option<AdapterError>,
    fail_balance: Option<AdapterError>,
    submitted: Vec<SubmittedOrder>,
    exits: Vec<u64>,
    price_calls: Vec<String>,
}

pub struct MockChainAdapter {
    family: ChainFamily,
    min_trade_size: f64,
    state: Arc<Mutex<MockState>>,
}

impl MockChainAdapter {
    pub fn new(family: ChainFamily) -> Self {
        Self {
            family,
            min_trade_size: 1.0,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with_min_trade_size(mut self, min: f64) -> Self {
        self.min_trade_size = min;
        self
    }

    pub fn with_balance(self, wallet: &str, balance: f64) -> Self {
        self.set_balance(wallet, balance);
        self
    }

    /// Fund a wallet whose address is only known after construction.
    pub fn set_balance(&self, wallet: &str, balance: f64) {
        self.state.lock().unwrap().balances.insert(wallet.to_string(), balance);
    }

    pub fn with_price(self, asset: &str, price: f64) -> Self {
        self.set_price(asset, price);
        self
    }

    pub fn with_submit_error(self, error: AdapterError) -> Self {
        self.state.lock().unwrap().fail_submit = Some(error);
        self
    }

    pub fn with_exit_error(self, error: AdapterError) -> Self {
        self.state.lock().unwrap().fail_exit = Some(error);
        self
    }

    pub fn with_balance_error(self, error: AdapterError) -> Self {
        self.state.lock().unwrap().fail_balance = Some(error);
        self
    }

    /// Move the mock market after construction (for monitor tick tests).
    pub fn set_price(&self, asset: &str, price: f64) {
        self.state.lock().unwrap().prices.insert(asset.to_string(), price);
    }

    pub fn submitted_orders(&self) -> Vec<SubmittedOrder> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn exited_positions(&self) -> Vec<u64> {
        self.state.lock().unwrap().exits.clone()
    }

    pub fn price_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().price_calls.clone()
    }
}

#[async_trait]
impl ChainAdapter for MockChainAdapter {
    fn family(&self) -> ChainFamily {
        self.family
    }

    fn min_trade_size(&self) -> f64 {
        self.min_trade_size
    }

    async fn available_balance(&self, wallet: &str) -> Result<f64, AdapterError> {
        let state = self.state.lock().unwrap();
        if let Some(err) = &state.fail_balance {
            return Err(err.clone());
        }
        Ok(*state.balances.get(wallet).unwrap_or(&0.0))
    }

    async fn spot_price(&self, asset: &str) -> Result<f64, AdapterError> {
        let mut state = self.state.lock().unwrap();
        state.price_calls.push(asset.to_string());
        state
            .prices
            .get(asset)
            .copied()
            .ok_or_else(|| AdapterError::Network(format!("no price for {asset}")))
    }

    async fn submit_order(
        &self,
        signer: &ChainSigner,
        asset: &str,
        side: Side,
        size: f64,
        _slippage_bps: u16,
    ) -> Result<OrderFill, AdapterError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.fail_submit {
            return Err(err.clone());
        }
        let price = *state
            .prices
            .get(asset)
            .ok_or_else(|| AdapterError::Network(format!("no price for {asset}")))?;
        state.submitted.push(SubmittedOrder {
            wallet: signer.address(),
            asset: asset.to_string(),
            side,
            size,
        });
        Ok(OrderFill {
            tx_id: format!("mock-entry-{}", state.submitted.len()),
            executed_price: price,
            executed_quantity: size / price,
        })
    }

    async fn submit_exit(
        &self,
        _signer: &ChainSigner,
        position: &Position,
        _slippage_bps: u16,
    ) -> Result<ExitFill, AdapterError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = &state.fail_exit {
            return Err(err.clone());
        }
        let price = *state
            .prices
            .get(&position.asset)
            .ok_or_else(|| AdapterError::Network(format!("no price for {}", position.asset)))?;
        state.exits.push(position.id);
        Ok(ExitFill {
            tx_id: format!("mock-exit-{}", state.exits.len()),
            executed_price: price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_orders() {
        let adapter = MockChainAdapter::new(ChainFamily::Ton).with_price("jetton1", 2.0);
        let seed = hex::encode([9u8; 32]);
        let signer = ChainSigner::from_secret(ChainFamily::Ton, seed.as_bytes()).unwrap();

        let fill = tokio_test::block_on(adapter.submit_order(&signer, "jetton1", Side::Buy, 10.0, 100))
            .unwrap();
        assert_eq!(fill.executed_quantity, 5.0);
        assert_eq!(adapter.submitted_orders().len(), 1);
        assert_eq!(adapter.submitted_orders()[0].asset, "jetton1");
    }

    #[tokio::test]
    async fn test_mock_configured_failure() {
        let adapter = MockChainAdapter::new(ChainFamily::Ton)
            .with_price("jetton1", 2.0)
            .with_submit_error(AdapterError::SlippageExceeded);
        let seed = hex::encode([9u8; 32]);
        let signer = ChainSigner::from_secret(ChainFamily::Ton, seed.as_bytes()).unwrap();

        let result = adapter
            .submit_order(&signer, "jetton1", Side::Buy, 10.0, 100)
            .await;
        assert!(matches!(result, Err(AdapterError::SlippageExceeded)));
        assert!(adapter.submitted_orders().is_empty());
    }
}
