//! PositionLedger - open/closed positions and per-user capacity slots.
//!
//! All mutating operations go through one mutex, which makes slot
//! reservation linearizable: two concurrent fan-out units for the same user
//! can never both reserve past the configured maximum. The user's limit is
//! read from the registry before the lock is taken; no lock is ever held
//! across a network call.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::storage::{JsonStore, StoreError};

use super::position::{Position, PositionError, PositionStatus};
use super::registry::UserRegistry;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Unknown position: {0}")]
    UnknownPosition(u64),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerSnapshot {
    next_id: u64,
    positions: Vec<Position>,
}

struct LedgerState {
    next_id: u64,
    positions: HashMap<u64, Position>,
    /// Open-position slots currently held per user, including reservations
    /// for submissions still in flight.
    open_slots: HashMap<u64, u32>,
}

impl LedgerState {
    fn snapshot(&self) -> LedgerSnapshot {
        let mut positions: Vec<_> = self.positions.values().cloned().collect();
        positions.sort_by_key(|p| p.id);
        LedgerSnapshot {
            next_id: self.next_id,
            positions,
        }
    }
}

pub struct PositionLedger {
    registry: Arc<UserRegistry>,
    state: Mutex<LedgerState>,
    store: JsonStore,
}

impl PositionLedger {
    /// Load the ledger from its store, rebuilding the slot counters from
    /// whatever positions were open at shutdown.
    pub fn load(store: JsonStore, registry: Arc<UserRegistry>) -> Result<Self, LedgerError> {
        let snapshot: LedgerSnapshot = store.load_or_default()?;
        let mut open_slots: HashMap<u64, u32> = HashMap::new();
        let mut positions = HashMap::new();
        let mut next_id = snapshot.next_id.max(1);
        for position in snapshot.positions {
            if position.is_open() {
                *open_slots.entry(position.user_id).or_default() += 1;
            }
            next_id = next_id.max(position.id + 1);
            positions.insert(position.id, position);
        }
        tracing::info!(
            total = positions.len(),
            open = open_slots.values().sum::<u32>(),
            "Position ledger loaded"
        );
        Ok(Self {
            registry,
            state: Mutex::new(LedgerState {
                next_id,
                positions,
                open_slots,
            }),
            store,
        })
    }

    /// Atomically reserve one position slot for the user. Returns false
    /// when the user is at capacity (the reservation is the capacity
    /// check). Callers must pair a successful reservation with either
    /// `record_open` or `release_slot`.
    pub async fn reserve_slot(&self, user_id: u64) -> bool {
        let max = match self.registry.get(user_id).await {
            Some(profile) => profile.max_positions,
            None => return false,
        };
        let mut state = self.state.lock().await;
        let held = state.open_slots.entry(user_id).or_default();
        if *held >= max {
            return false;
        }
        *held += 1;
        true
    }

    /// Give back a reserved slot after a failed or skipped submission.
    pub async fn release_slot(&self, user_id: u64) {
        let mut state = self.state.lock().await;
        if let Some(held) = state.open_slots.get_mut(&user_id) {
            *held = held.saturating_sub(1);
        }
    }

    /// Record a freshly opened position against an already-reserved slot.
    /// Returns the assigned position id.
    pub async fn record_open(&self, mut position: Position) -> Result<u64, LedgerError> {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        position.id = id;
        state.positions.insert(id, position);
        self.store.save(&state.snapshot())?;
        Ok(id)
    }

    /// Transition a position into a terminal state and free its slot.
    /// Returns the closed position for stats accounting.
    pub async fn record_closed(
        &self,
        position_id: u64,
        status: PositionStatus,
        exit_price: Option<f64>,
        exit_tx: Option<String>,
    ) -> Result<Position, LedgerError> {
        let mut state = self.state.lock().await;
        let position = state
            .positions
            .get_mut(&position_id)
            .ok_or(LedgerError::UnknownPosition(position_id))?;
        position.close(status, exit_price, exit_tx)?;
        let closed = position.clone();
        if let Some(held) = state.open_slots.get_mut(&closed.user_id) {
            *held = held.saturating_sub(1);
        }
        self.store.save(&state.snapshot())?;
        Ok(closed)
    }

    /// Snapshot of all open positions, for the monitor tick.
    pub async fn list_open(&self) -> Vec<Position> {
        let state = self.state.lock().await;
        let mut open: Vec<_> = state
            .positions
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|p| p.id);
        open
    }

    /// All positions for one user, newest first. Display accessor for the
    /// command layer.
    pub async fn user_positions(&self, user_id: u64) -> Vec<Position> {
        let state = self.state.lock().await;
        let mut positions: Vec<_> = state
            .positions
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        positions.sort_by(|a, b| b.id.cmp(&a.id));
        positions
    }

    pub async fn open_count(&self, user_id: u64) -> u32 {
        *self
            .state
            .lock()
            .await
            .open_slots
            .get(&user_id)
            .unwrap_or(&0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{ChainFamily, Side};
    use tempfile::TempDir;

    async fn setup(dir: &TempDir, max_positions: u32) -> (Arc<UserRegistry>, PositionLedger) {
        let users = JsonStore::open(dir.path(), "users.json").unwrap();
        let registry = Arc::new(UserRegistry::load(users).unwrap());
        registry.register(1, None).await.unwrap();
        registry
            .update(1, |u| u.set_max_positions(max_positions))
            .await
            .unwrap();
        let positions = JsonStore::open(dir.path(), "positions.json").unwrap();
        let ledger = PositionLedger::load(positions, Arc::clone(&registry)).unwrap();
        (registry, ledger)
    }

    fn open_position(user_id: u64) -> Position {
        Position::open(
            user_id,
            ChainFamily::Solana,
            "mint111",
            "X/USDC",
            Side::Buy,
            10.0,
            5.0,
            50.0,
            9.0,
            12.0,
            false,
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_reserve_up_to_max() {
        let dir = TempDir::new().unwrap();
        let (_reg, ledger) = setup(&dir, 2).await;
        assert!(ledger.reserve_slot(1).await);
        assert!(ledger.reserve_slot(1).await);
        assert!(!ledger.reserve_slot(1).await);
        ledger.release_slot(1).await;
        assert!(ledger.reserve_slot(1).await);
    }

    #[tokio::test]
    async fn test_reserve_unknown_user_fails() {
        let dir = TempDir::new().unwrap();
        let (_reg, ledger) = setup(&dir, 1).await;
        assert!(!ledger.reserve_slot(99).await);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_overshoot() {
        let dir = TempDir::new().unwrap();
        let (_reg, ledger) = setup(&dir, 3).await;
        let ledger = Arc::new(ledger);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move { ledger.reserve_slot(1).await }));
        }
        let granted = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();
        assert_eq!(granted, 3);
        assert_eq!(ledger.open_count(1).await, 3);
    }

    #[tokio::test]
    async fn test_record_open_and_close_releases_slot() {
        let dir = TempDir::new().unwrap();
        let (_reg, ledger) = setup(&dir, 1).await;

        assert!(ledger.reserve_slot(1).await);
        let id = ledger.record_open(open_position(1)).await.unwrap();
        assert_eq!(ledger.list_open().await.len(), 1);
        assert!(!ledger.reserve_slot(1).await);

        let closed = ledger
            .record_closed(id, PositionStatus::ClosedTp, Some(12.1), None)
            .await
            .unwrap();
        assert_eq!(closed.status, PositionStatus::ClosedTp);
        assert!(ledger.list_open().await.is_empty());
        assert!(ledger.reserve_slot(1).await);
    }

    #[tokio::test]
    async fn test_closed_positions_are_retained() {
        let dir = TempDir::new().unwrap();
        let (_reg, ledger) = setup(&dir, 1).await;
        assert!(ledger.reserve_slot(1).await);
        let id = ledger.record_open(open_position(1)).await.unwrap();
        ledger
            .record_closed(id, PositionStatus::ClosedSl, Some(8.9), None)
            .await
            .unwrap();
        let history = ledger.user_positions(1).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, PositionStatus::ClosedSl);
    }

    #[tokio::test]
    async fn test_double_close_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (_reg, ledger) = setup(&dir, 1).await;
        assert!(ledger.reserve_slot(1).await);
        let id = ledger.record_open(open_position(1)).await.unwrap();
        ledger
            .record_closed(id, PositionStatus::ClosedTp, Some(12.1), None)
            .await
            .unwrap();
        let err = ledger
            .record_closed(id, PositionStatus::ClosedSl, Some(8.9), None)
            .await;
        assert!(matches!(err, Err(LedgerError::Position(_))));
    }

    #[tokio::test]
    async fn test_slots_rebuilt_after_reload() {
        let dir = TempDir::new().unwrap();
        let registry = {
            let (registry, ledger) = setup(&dir, 1).await;
            assert!(ledger.reserve_slot(1).await);
            ledger.record_open(open_position(1)).await.unwrap();
            registry
        };
        let store = JsonStore::open(dir.path(), "positions.json").unwrap();
        let ledger = PositionLedger::load(store, registry).unwrap();
        assert_eq!(ledger.open_count(1).await, 1);
        assert!(!ledger.reserve_slot(1).await);
    }
}
