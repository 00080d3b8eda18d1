//! UserRegistry - authoritative record of every user's settings.
//!
//! The registry is an in-memory map loaded once at startup and written
//! through to its JSON store on every mutation; the dispatcher and monitor
//! always read current values (no staleness for auto-trade or capital
//! settings). It is handed around as an explicit `Arc`, never a global.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::storage::{JsonStore, StoreError};

use super::position::PositionStatus;
use super::user::{UserError, UserProfile};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown user: {0}")]
    UnknownUser(u64),
    #[error(transparent)]
    Setting(#[from] UserError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct UserRegistry {
    users: RwLock<HashMap<u64, UserProfile>>,
    store: JsonStore,
}

impl UserRegistry {
    /// Load the registry from its store. Fatal at the call site if the
    /// store is unreadable.
    pub fn load(store: JsonStore) -> Result<Self, RegistryError> {
        let users: HashMap<u64, UserProfile> = store.load_or_default()?;
        tracing::info!(users = users.len(), "User registry loaded");
        Ok(Self {
            users: RwLock::new(users),
            store,
        })
    }

    /// Register a new user or return the existing profile. The first user
    /// ever registered becomes admin.
    pub async fn register(
        &self,
        user_id: u64,
        username: Option<String>,
    ) -> Result<UserProfile, RegistryError> {
        let mut users = self.users.write().await;
        if let Some(existing) = users.get(&user_id) {
            return Ok(existing.clone());
        }
        let is_admin = users.is_empty();
        let profile = UserProfile::new(user_id, username, is_admin);
        users.insert(user_id, profile.clone());
        self.store.save(&*users)?;
        tracing::info!(user_id, is_admin, "User registered");
        Ok(profile)
    }

    pub async fn get(&self, user_id: u64) -> Option<UserProfile> {
        self.users.read().await.get(&user_id).cloned()
    }

    pub async fn list(&self) -> Vec<UserProfile> {
        let mut all: Vec<_> = self.users.read().await.values().cloned().collect();
        all.sort_by_key(|u| u.user_id);
        all
    }

    /// Users eligible for fan-out: auto-trade enabled, ordered by id so
    /// dispatch outcomes come back in a stable order.
    pub async fn auto_traders(&self) -> Vec<UserProfile> {
        let mut eligible: Vec<_> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| u.auto_trade)
            .cloned()
            .collect();
        eligible.sort_by_key(|u| u.user_id);
        eligible
    }

    /// Apply a validated mutation to one profile and persist.
    pub async fn update<F>(&self, user_id: u64, mutate: F) -> Result<UserProfile, RegistryError>
    where
        F: FnOnce(&mut UserProfile) -> Result<(), UserError>,
    {
        let mut users = self.users.write().await;
        let profile = users
            .get_mut(&user_id)
            .ok_or(RegistryError::UnknownUser(user_id))?;
        mutate(profile)?;
        let updated = profile.clone();
        self.store.save(&*users)?;
        Ok(updated)
    }

    pub async fn set_auto_trade(&self, user_id: u64, enabled: bool) -> Result<(), RegistryError> {
        self.update(user_id, |u| {
            u.auto_trade = enabled;
            Ok(())
        })
        .await?;
        tracing::info!(user_id, enabled, "Auto-trade flag updated");
        Ok(())
    }

    pub async fn set_dry_run(&self, user_id: u64, enabled: bool) -> Result<(), RegistryError> {
        self.update(user_id, |u| {
            u.dry_run = enabled;
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Fold a closed position into the owner's stats. This is the only
    /// writer path into stats; it runs from the monitor's close handling.
    pub async fn record_trade_result(
        &self,
        user_id: u64,
        status: PositionStatus,
        pnl: Option<f64>,
    ) -> Result<(), RegistryError> {
        self.update(user_id, |u| {
            u.stats.record_close(status, pnl);
            Ok(())
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> UserRegistry {
        let store = JsonStore::open(dir.path(), "users.json").unwrap();
        UserRegistry::load(store).unwrap()
    }

    #[tokio::test]
    async fn test_first_user_is_admin() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let first = reg.register(1, None).await.unwrap();
        let second = reg.register(2, None).await.unwrap();
        assert!(first.is_admin);
        assert!(!second.is_admin);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let a = reg.register(1, Some("alice".to_string())).await.unwrap();
        let b = reg.register(1, Some("other".to_string())).await.unwrap();
        assert_eq!(a.username, b.username);
        assert_eq!(reg.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_auto_traders_filter() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.register(1, None).await.unwrap();
        reg.register(2, None).await.unwrap();
        reg.set_auto_trade(2, false).await.unwrap();

        let eligible = reg.auto_traders().await;
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].user_id, 1);
    }

    #[tokio::test]
    async fn test_update_validates() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.register(1, None).await.unwrap();

        let err = reg.update(1, |u| u.set_capital_pct(150.0)).await;
        assert!(matches!(err, Err(RegistryError::Setting(_))));
        // Unchanged after the failed mutation attempt persisted nothing.
        assert_eq!(reg.get(1).await.unwrap().capital_pct, 5.0);
    }

    #[tokio::test]
    async fn test_mutations_survive_reload() {
        let dir = TempDir::new().unwrap();
        {
            let reg = registry(&dir);
            reg.register(1, None).await.unwrap();
            reg.update(1, |u| u.set_capital_pct(12.5)).await.unwrap();
            reg.record_trade_result(1, PositionStatus::ClosedTp, Some(42.0))
                .await
                .unwrap();
        }
        let reg = registry(&dir);
        let user = reg.get(1).await.unwrap();
        assert_eq!(user.capital_pct, 12.5);
        assert_eq!(user.stats.wins, 1);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let err = reg.set_auto_trade(99, true).await;
        assert!(matches!(err, Err(RegistryError::UnknownUser(99))));
    }
}
