//! Ports layer - trait contracts between the engine and the outside world.

pub mod chain;
pub mod mocks;

pub use chain::{AdapterError, ChainAdapter, ExitFill, OrderFill};
