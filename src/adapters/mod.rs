//! Chain adapter implementations and their shared plumbing.

pub mod cli;
pub mod evm;
pub mod retry;
pub mod solana;
pub mod ton;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::signal::ChainFamily;
use crate::ports::chain::ChainAdapter;

pub use retry::{with_backoff, RetryPolicy};

/// Adapter registry keyed by chain family. Families without a configured
/// adapter are simply absent; signals for them resolve to per-user skips.
#[derive(Default, Clone)]
pub struct ChainAdapters {
    adapters: HashMap<ChainFamily, Arc<dyn ChainAdapter>>,
}

impl ChainAdapters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.family(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.insert(adapter);
        self
    }

    pub fn get(&self, family: ChainFamily) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.get(&family).cloned()
    }

    pub fn families(&self) -> Vec<ChainFamily> {
        let mut families: Vec<_> = self.adapters.keys().copied().collect();
        families.sort_by_key(|f| f.as_str());
        families
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::MockChainAdapter;

    #[test]
    fn test_registry_lookup() {
        let adapters =
            ChainAdapters::new().with(Arc::new(MockChainAdapter::new(ChainFamily::Solana)));
        assert!(adapters.get(ChainFamily::Solana).is_some());
        assert!(adapters.get(ChainFamily::Ton).is_none());
        assert_eq!(adapters.families(), vec![ChainFamily::Solana]);
    }
}
