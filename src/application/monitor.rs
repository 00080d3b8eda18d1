//! Background stop-loss / take-profit watcher.
//!
//! One loop owns every open position. Each tick it snapshots the ledger,
//! fetches one spot price per (chain, asset) group and walks the open
//! positions against their targets. Exits are routed through the same
//! scoped-signer path as entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::adapters::ChainAdapters;
use crate::domain::ledger::PositionLedger;
use crate::domain::position::{Position, PositionStatus};
use crate::domain::registry::UserRegistry;
use crate::domain::signal::ChainFamily;
use crate::ports::chain::ChainAdapter;
use crate::vault::WalletVault;

pub struct PositionMonitor {
    registry: Arc<UserRegistry>,
    ledger: Arc<PositionLedger>,
    vault: Arc<WalletVault>,
    adapters: ChainAdapters,
    interval: Duration,
}

impl PositionMonitor {
    pub fn new(
        registry: Arc<UserRegistry>,
        ledger: Arc<PositionLedger>,
        vault: Arc<WalletVault>,
        adapters: ChainAdapters,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            ledger,
            vault,
            adapters,
            interval,
        }
    }

    /// Run the monitor loop until the shutdown flag flips. The in-flight
    /// tick finishes before the task exits, so no position is left
    /// half-closed.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval = ?self.interval, "Position monitor started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.tick().await,
                    changed = shutdown.changed() => {
                        // A dropped sender counts as a shutdown request.
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Position monitor stopping");
                            return;
                        }
                    }
                }
            }
        })
    }

    /// One monitoring pass over every open position.
    pub async fn tick(&self) {
        let open = self.ledger.list_open().await;
        if open.is_empty() {
            return;
        }

        let mut groups: HashMap<(ChainFamily, String), Vec<Position>> = HashMap::new();
        for position in open {
            groups
                .entry((position.chain, position.asset.clone()))
                .or_default()
                .push(position);
        }

        for ((chain, asset), positions) in groups {
            let Some(adapter) = self.adapters.get(chain) else {
                warn!(%chain, %asset, "No adapter for open positions on chain");
                continue;
            };
            // One price serves the whole group; a failed fetch just defers
            // the group to the next tick.
            let price = match adapter.spot_price(&asset).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(%chain, %asset, %e, "Price fetch failed, deferring group");
                    continue;
                }
            };
            for position in positions {
                self.evaluate(&adapter, position, price).await;
            }
        }
    }

    async fn evaluate(&self, adapter: &Arc<dyn ChainAdapter>, position: Position, price: f64) {
        let crossed_tp = price >= position.take_profit;
        let crossed_sl = price <= position.stop_loss;
        let status = match (crossed_tp, crossed_sl) {
            (false, false) => return,
            // Both targets crossed at once means the stored targets are
            // inverted. Never route an exit on a position like that.
            (true, true) => {
                error!(
                    position_id = position.id,
                    user_id = position.user_id,
                    price,
                    stop_loss = position.stop_loss,
                    take_profit = position.take_profit,
                    "Position targets are inconsistent, closing as errored"
                );
                self.finalize(&position, PositionStatus::ClosedError, None, None)
                    .await;
                return;
            }
            (true, false) => PositionStatus::ClosedTp,
            (false, true) => PositionStatus::ClosedSl,
        };

        if position.simulated {
            self.finalize(&position, status, Some(price), None).await;
            return;
        }

        let slippage_bps = match self.registry.get(position.user_id).await {
            Some(profile) => profile.slippage_bps,
            None => {
                error!(
                    position_id = position.id,
                    user_id = position.user_id,
                    "Open position belongs to an unknown user"
                );
                self.finalize(&position, PositionStatus::ClosedError, None, None)
                    .await;
                return;
            }
        };

        let fill = self
            .vault
            .with_signer(position.user_id, position.chain, |signer| {
                let position = position.clone();
                let adapter = Arc::clone(adapter);
                async move { adapter.submit_exit(&signer, &position, slippage_bps).await }
            })
            .await;
        match fill {
            Ok(Ok(fill)) => {
                self.finalize(&position, status, Some(fill.executed_price), Some(fill.tx_id))
                    .await;
            }
            Ok(Err(e)) => {
                // The adapter already burned its retry budget on transient
                // errors; whatever is left is terminal for this position.
                error!(
                    position_id = position.id,
                    user_id = position.user_id,
                    %e,
                    "Exit submission failed, closing as errored"
                );
                self.finalize(&position, PositionStatus::ClosedError, None, None)
                    .await;
            }
            Err(e) => {
                // The credential is gone or cannot decrypt; no future tick
                // can fix that either.
                error!(
                    position_id = position.id,
                    user_id = position.user_id,
                    %e,
                    "Cannot sign exit for open position, closing as errored"
                );
                self.finalize(&position, PositionStatus::ClosedError, None, None)
                    .await;
            }
        }
    }

    /// Persist the close and fold it into the owner's stats.
    async fn finalize(
        &self,
        position: &Position,
        status: PositionStatus,
        exit_price: Option<f64>,
        exit_tx: Option<String>,
    ) {
        let closed = match self
            .ledger
            .record_closed(position.id, status, exit_price, exit_tx)
            .await
        {
            Ok(closed) => closed,
            Err(e) => {
                error!(position_id = position.id, %e, "Failed to record close");
                return;
            }
        };
        info!(
            position_id = closed.id,
            user_id = closed.user_id,
            pair = %closed.pair,
            status = ?closed.status,
            exit_price = closed.exit_price,
            pnl = closed.pnl,
            simulated = closed.simulated,
            "Position closed"
        );
        if let Err(e) = self
            .registry
            .record_trade_result(closed.user_id, closed.status, closed.pnl)
            .await
        {
            error!(user_id = closed.user_id, %e, "Failed to update trade stats");
        }
    }
}
