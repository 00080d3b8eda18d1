//! Signal fan-out.
//!
//! One incoming signal becomes one independent dispatch unit per
//! auto-trading user. Units run concurrently, never see each other, and
//! each resolves to exactly one `UserOutcome`. A panic or error in one
//! unit cannot touch another user's money.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::adapters::ChainAdapters;
use crate::domain::ledger::PositionLedger;
use crate::domain::outcome::{SkipReason, UserOutcome};
use crate::domain::position::Position;
use crate::domain::registry::UserRegistry;
use crate::domain::signal::{Side, Signal};
use crate::domain::user::UserProfile;
use crate::ports::chain::{ChainAdapter, OrderFill};
use crate::vault::{VaultError, WalletVault};

/// Fill prices this far off the author's quoted price get flagged in logs.
const PRICE_HINT_TOLERANCE: f64 = 0.25;

pub struct Dispatcher {
    registry: Arc<UserRegistry>,
    ledger: Arc<PositionLedger>,
    vault: Arc<WalletVault>,
    adapters: ChainAdapters,
    /// Forces every unit down the simulation path regardless of per-user
    /// settings.
    global_dry_run: bool,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<UserRegistry>,
        ledger: Arc<PositionLedger>,
        vault: Arc<WalletVault>,
        adapters: ChainAdapters,
        global_dry_run: bool,
    ) -> Self {
        Self {
            registry,
            ledger,
            vault,
            adapters,
            global_dry_run,
        }
    }

    /// Fan one signal out to every auto-trading user. The returned outcomes
    /// are ordered by user id, one entry per eligible user, regardless of
    /// what happened inside the units.
    pub async fn handle_signal(&self, signal: &Signal) -> Vec<UserOutcome> {
        let traders = self.registry.auto_traders().await;
        info!(
            asset = %signal.asset,
            pair = %signal.pair,
            chain = %signal.chain,
            side = %signal.side,
            users = traders.len(),
            "Dispatching signal"
        );

        let Some(adapter) = self.adapters.get(signal.chain) else {
            warn!(chain = %signal.chain, "No adapter configured for chain, skipping all users");
            return traders
                .iter()
                .map(|u| UserOutcome::skipped(u.user_id, SkipReason::Order))
                .collect();
        };

        let handles: Vec<_> = traders
            .into_iter()
            .map(|profile| {
                let unit = DispatchUnit {
                    ledger: Arc::clone(&self.ledger),
                    vault: Arc::clone(&self.vault),
                    adapter: Arc::clone(&adapter),
                    signal: signal.clone(),
                    global_dry_run: self.global_dry_run,
                };
                let user_id = profile.user_id;
                (user_id, tokio::spawn(unit.run(profile)))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (user_id, handle) in handles {
            outcomes.push(match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    error!(user_id, %join_err, "Dispatch unit panicked");
                    UserOutcome::skipped(user_id, SkipReason::Order)
                }
            });
        }

        let opened = outcomes.iter().filter(|o| !o.is_skip()).count();
        info!(
            asset = %signal.asset,
            opened,
            skipped = outcomes.len() - opened,
            "Signal dispatched"
        );
        outcomes
    }
}

/// Everything one per-user unit needs, owned so it can be spawned.
struct DispatchUnit {
    ledger: Arc<PositionLedger>,
    vault: Arc<WalletVault>,
    adapter: Arc<dyn ChainAdapter>,
    signal: Signal,
    global_dry_run: bool,
}

impl DispatchUnit {
    async fn run(self, profile: UserProfile) -> UserOutcome {
        let user_id = profile.user_id;
        match self.execute(&profile).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                info!(user_id, asset = %self.signal.asset, %reason, "Signal skipped");
                UserOutcome::skipped(user_id, reason)
            }
        }
    }

    async fn execute(&self, profile: &UserProfile) -> Result<UserOutcome, SkipReason> {
        let user_id = profile.user_id;
        if self.signal.side != Side::Buy {
            return Err(SkipReason::UnsupportedSide);
        }
        let wallet = self
            .vault
            .address_of(user_id, self.signal.chain)
            .await
            .ok_or(SkipReason::NoWallet)?;

        // The reservation is the capacity check. A full user is a terminal
        // skip for this delivery; nothing is queued.
        if !self.ledger.reserve_slot(user_id).await {
            return Err(SkipReason::MaxPositions);
        }
        match self.execute_reserved(profile, &wallet).await {
            Ok(outcome) => Ok(outcome),
            Err(reason) => {
                self.ledger.release_slot(user_id).await;
                Err(reason)
            }
        }
    }

    /// Everything past the slot reservation. Any error here must bubble to
    /// `execute` so the slot is given back.
    async fn execute_reserved(
        &self,
        profile: &UserProfile,
        wallet: &str,
    ) -> Result<UserOutcome, SkipReason> {
        let user_id = profile.user_id;
        let balance = self
            .adapter
            .available_balance(wallet)
            .await
            .map_err(|e| e.skip_reason())?;
        let size = profile.capital_pct / 100.0 * balance;
        if size < self.adapter.min_trade_size() {
            return Err(SkipReason::InsufficientFunds);
        }

        if self.global_dry_run || profile.dry_run {
            return self.simulate_entry(profile, size).await;
        }

        let fill = self
            .vault
            .with_signer(user_id, self.signal.chain, |signer| async move {
                self.adapter
                    .submit_order(
                        &signer,
                        &self.signal.asset,
                        self.signal.side,
                        size,
                        profile.slippage_bps,
                    )
                    .await
            })
            .await
            .map_err(vault_skip_reason)?
            .map_err(|e| {
                warn!(user_id, asset = %self.signal.asset, %e, "Order submission failed");
                e.skip_reason()
            })?;
        self.check_price_hint(&fill);

        let position_id = self
            .record_entry(profile, &fill, size, false, Some(fill.tx_id.clone()))
            .await?;
        info!(
            user_id,
            position_id,
            asset = %self.signal.asset,
            price = fill.executed_price,
            quantity = fill.executed_quantity,
            spent = size,
            "Position opened"
        );
        Ok(UserOutcome::opened(user_id, position_id))
    }

    /// Dry-run entry: priced off spot, persisted like a real position but
    /// flagged simulated so the monitor never routes an exit for it.
    async fn simulate_entry(
        &self,
        profile: &UserProfile,
        size: f64,
    ) -> Result<UserOutcome, SkipReason> {
        let price = self
            .adapter
            .spot_price(&self.signal.asset)
            .await
            .map_err(|e| e.skip_reason())?;
        let fill = OrderFill {
            tx_id: String::new(),
            executed_price: price,
            executed_quantity: size / price,
        };
        let position_id = self.record_entry(profile, &fill, size, true, None).await?;
        info!(
            user_id = profile.user_id,
            position_id,
            asset = %self.signal.asset,
            price,
            "Simulated position opened"
        );
        Ok(UserOutcome::simulated(profile.user_id, position_id))
    }

    async fn record_entry(
        &self,
        profile: &UserProfile,
        fill: &OrderFill,
        size: f64,
        simulated: bool,
        entry_tx: Option<String>,
    ) -> Result<u64, SkipReason> {
        let (stop_loss, take_profit) = profile.risk_targets(fill.executed_price);
        let position = Position::open(
            profile.user_id,
            self.signal.chain,
            self.signal.asset.clone(),
            self.signal.pair.clone(),
            self.signal.side,
            fill.executed_price,
            fill.executed_quantity,
            size,
            stop_loss,
            take_profit,
            simulated,
            entry_tx,
        )
        .map_err(|e| {
            error!(user_id = profile.user_id, %e, "Fill produced an invalid position");
            SkipReason::Order
        })?;
        self.ledger.record_open(position).await.map_err(|e| {
            // The swap may already be on chain; losing the record is the
            // loudest failure this unit can have.
            error!(user_id = profile.user_id, %e, "Failed to persist opened position");
            SkipReason::Order
        })
    }

    fn check_price_hint(&self, fill: &OrderFill) {
        if let Some(hint) = self.signal.price_hint {
            let deviation = (fill.executed_price - hint).abs() / hint;
            if deviation > PRICE_HINT_TOLERANCE {
                warn!(
                    asset = %self.signal.asset,
                    hint,
                    executed = fill.executed_price,
                    "Fill price far from signal's quoted price"
                );
            }
        }
    }
}

fn vault_skip_reason(err: VaultError) -> SkipReason {
    match err {
        VaultError::NoWallet { .. } => SkipReason::NoWallet,
        other => {
            warn!(%other, "Vault error during dispatch");
            SkipReason::Signature
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use solana_sdk::signature::Keypair;
    use tempfile::TempDir;

    use crate::domain::signal::ChainFamily;
    use crate::ports::chain::AdapterError;
    use crate::ports::mocks::MockChainAdapter;
    use crate::storage::JsonStore;
    use crate::vault::load_master_key;

    const MINT: &str = "So11111111111111111111111111111111111111112";

    struct Harness {
        registry: Arc<UserRegistry>,
        ledger: Arc<PositionLedger>,
        vault: Arc<WalletVault>,
        adapter: Arc<MockChainAdapter>,
        _dir: TempDir,
    }

    impl Harness {
        fn dispatcher(&self, global_dry_run: bool) -> Dispatcher {
            let adapters = ChainAdapters::new().with(self.adapter.clone());
            Dispatcher::new(
                Arc::clone(&self.registry),
                Arc::clone(&self.ledger),
                Arc::clone(&self.vault),
                adapters,
                global_dry_run,
            )
        }

        /// Register a user with a Solana wallet and return its address.
        async fn add_user(&self, user_id: u64) -> String {
            self.registry.register(user_id, None).await.unwrap();
            let secret = Keypair::new().to_base58_string();
            self.vault
                .add_credential(user_id, ChainFamily::Solana, &secret)
                .await
                .unwrap()
        }
    }

    async fn harness(adapter: MockChainAdapter) -> Harness {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(
            UserRegistry::load(JsonStore::open(dir.path(), "users.json").unwrap()).unwrap(),
        );
        let ledger = Arc::new(
            PositionLedger::load(
                JsonStore::open(dir.path(), "positions.json").unwrap(),
                Arc::clone(&registry),
            )
            .unwrap(),
        );
        let key = load_master_key(dir.path()).unwrap();
        let vault = Arc::new(
            WalletVault::load(JsonStore::open(dir.path(), "wallets.json").unwrap(), &key).unwrap(),
        );
        Harness {
            registry,
            ledger,
            vault,
            adapter: Arc::new(adapter),
            _dir: dir,
        }
    }

    fn signal() -> Signal {
        Signal::new(MINT, "SOL/USDC", ChainFamily::Solana, Side::Buy, None).unwrap()
    }

    #[tokio::test]
    async fn test_sizing_follows_capital_pct() {
        let h = harness(MockChainAdapter::new(ChainFamily::Solana).with_price(MINT, 10.0)).await;
        let wallet = h.add_user(1).await;
        h.adapter.set_balance(&wallet, 1000.0);

        let outcomes = h.dispatcher(false).handle_signal(&signal()).await;
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0].outcome,
            crate::domain::outcome::DispatchOutcome::Opened { .. }
        ));

        let orders = h.adapter.submitted_orders();
        assert_eq!(orders.len(), 1);
        // 5% default of 1000 quote units.
        assert!((orders[0].size - 50.0).abs() < 1e-9);

        let positions = h.ledger.user_positions(1).await;
        assert!((positions[0].quantity - 5.0).abs() < 1e-9);
        assert!((positions[0].entry_spent - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sell_signals_are_skipped() {
        let h = harness(MockChainAdapter::new(ChainFamily::Solana).with_price(MINT, 10.0)).await;
        let wallet = h.add_user(1).await;
        h.adapter.set_balance(&wallet, 1000.0);

        let sell = Signal::new(MINT, "SOL/USDC", ChainFamily::Solana, Side::Sell, None).unwrap();
        let outcomes = h.dispatcher(false).handle_signal(&sell).await;
        assert_eq!(
            outcomes[0],
            UserOutcome::skipped(1, SkipReason::UnsupportedSide)
        );
        assert!(h.adapter.submitted_orders().is_empty());
    }

    #[tokio::test]
    async fn test_no_wallet_for_chain_is_isolated_skip() {
        let h = harness(MockChainAdapter::new(ChainFamily::Solana).with_price(MINT, 10.0)).await;
        let wallet = h.add_user(1).await;
        h.adapter.set_balance(&wallet, 1000.0);
        // Second user never registered a wallet.
        h.registry.register(2, None).await.unwrap();

        let outcomes = h.dispatcher(false).handle_signal(&signal()).await;
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].is_skip());
        assert_eq!(outcomes[1], UserOutcome::skipped(2, SkipReason::NoWallet));
    }

    #[tokio::test]
    async fn test_second_signal_hits_max_positions() {
        let h = harness(MockChainAdapter::new(ChainFamily::Solana).with_price(MINT, 10.0)).await;
        let wallet = h.add_user(1).await;
        h.adapter.set_balance(&wallet, 1000.0);

        let dispatcher = h.dispatcher(false);
        let first = dispatcher.handle_signal(&signal()).await;
        assert!(!first[0].is_skip());
        // Default max_positions is 1; a second delivery is a clean skip.
        let second = dispatcher.handle_signal(&signal()).await;
        assert_eq!(
            second[0],
            UserOutcome::skipped(1, SkipReason::MaxPositions)
        );
        assert_eq!(h.adapter.submitted_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_simulates_without_submitting() {
        let h = harness(MockChainAdapter::new(ChainFamily::Solana).with_price(MINT, 10.0)).await;
        let wallet = h.add_user(1).await;
        h.adapter.set_balance(&wallet, 1000.0);
        h.registry.set_dry_run(1, true).await.unwrap();

        let outcomes = h.dispatcher(false).handle_signal(&signal()).await;
        assert!(matches!(
            outcomes[0].outcome,
            crate::domain::outcome::DispatchOutcome::Simulated { .. }
        ));
        assert!(h.adapter.submitted_orders().is_empty());

        let positions = h.ledger.user_positions(1).await;
        assert!(positions[0].simulated);
        assert!(positions[0].entry_tx.is_none());
    }

    #[tokio::test]
    async fn test_submit_failure_releases_slot() {
        let h = harness(
            MockChainAdapter::new(ChainFamily::Solana)
                .with_price(MINT, 10.0)
                .with_submit_error(AdapterError::SlippageExceeded),
        )
        .await;
        let wallet = h.add_user(1).await;
        h.adapter.set_balance(&wallet, 1000.0);

        let outcomes = h.dispatcher(false).handle_signal(&signal()).await;
        assert_eq!(
            outcomes[0],
            UserOutcome::skipped(1, SkipReason::SlippageExceeded)
        );
        // The slot must be free again for the next delivery.
        assert_eq!(h.ledger.open_count(1).await, 0);
        assert!(h.ledger.reserve_slot(1).await);
    }

    #[tokio::test]
    async fn test_small_balance_skips_before_submission() {
        let h = harness(
            MockChainAdapter::new(ChainFamily::Solana)
                .with_price(MINT, 10.0)
                .with_min_trade_size(5.0),
        )
        .await;
        let wallet = h.add_user(1).await;
        // 5% of 20 is 1.0, below the 5.0 minimum.
        h.adapter.set_balance(&wallet, 20.0);

        let outcomes = h.dispatcher(false).handle_signal(&signal()).await;
        assert_eq!(
            outcomes[0],
            UserOutcome::skipped(1, SkipReason::InsufficientFunds)
        );
        assert!(h.adapter.submitted_orders().is_empty());
        assert_eq!(h.ledger.open_count(1).await, 0);
    }
}
