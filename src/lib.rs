pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod reconcile;

pub use config::Config;
pub use datasource::{DataSource, DataSourceError, HyperliquidDataSource, MockDataSource};
pub use db::{init_db, Repository, StoreError, TradeStore};
pub use domain::{
    AccumulatorState, Address, Coin, Decimal, Direction, Fill, LedgerEntry, PositionSide, Side,
    TimeMs,
};
pub use error::AppError;
pub use orchestration::{LedgerObserver, LogObserver, Monitor};
pub use reconcile::{CycleReport, ReconcileError, Reconciler};
