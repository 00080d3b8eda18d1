//! Orchestration: signal fan-out and the SL/TP monitor loop.

pub mod dispatcher;
pub mod monitor;

pub use dispatcher::Dispatcher;
pub use monitor::PositionMonitor;
