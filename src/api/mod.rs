pub mod health;
pub mod ledger;
pub mod pnl;
pub mod positions;

use crate::config::Config;
use crate::db::Repository;
use crate::domain::{Address, Coin, TimeMs};
use crate::error::AppError;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config) -> Self {
        Self { repo, config }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/ledger", get(ledger::get_ledger))
        .route("/v1/ledger/export", get(ledger::export_ledger))
        .route("/v1/pnl", get(pnl::get_pnl))
        .route("/v1/summary", get(pnl::get_summary))
        .route("/v1/positions", get(positions::get_positions))
        .layer(cors)
        .with_state(state)
}

pub(crate) fn parse_account(account: &str) -> Result<Address, AppError> {
    let account = account.trim();
    let Some(hex_part) = account.strip_prefix("0x") else {
        return Err(AppError::BadRequest("Invalid account address".into()));
    };
    if hex_part.is_empty()
        || hex_part.len() > 40
        || !hex_part.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(AppError::BadRequest("Invalid account address".into()));
    }
    Ok(Address::new(account.to_string()))
}

pub(crate) fn parse_coin(coin: Option<&str>) -> Option<Coin> {
    coin.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Coin::new(s.to_string()))
}

pub(crate) fn parse_window(
    from_ms: Option<i64>,
    to_ms: Option<i64>,
) -> Result<(Option<TimeMs>, Option<TimeMs>), AppError> {
    let from_ms = from_ms.map(TimeMs::new);
    let to_ms = to_ms.map(TimeMs::new);
    if let (Some(from), Some(to)) = (from_ms, to_ms) {
        if from > to {
            return Err(AppError::BadRequest("fromMs must be <= toMs".into()));
        }
    }
    Ok((from_ms, to_ms))
}
