//! Long-running supervision of the reconciler.

pub mod monitor;
pub mod observer;

pub use monitor::{Monitor, MonitorCycle};
pub use observer::{LedgerObserver, LogObserver};
