//! Core business types and the two authoritative registries.

pub mod ledger;
pub mod outcome;
pub mod position;
pub mod registry;
pub mod signal;
pub mod user;

pub use ledger::{LedgerError, PositionLedger};
pub use outcome::{DispatchOutcome, SkipReason, UserOutcome};
pub use position::{Position, PositionError, PositionStatus};
pub use registry::{RegistryError, UserRegistry};
pub use signal::{ChainFamily, Side, Signal, SignalError};
pub use user::{TradeStats, UserError, UserProfile};
