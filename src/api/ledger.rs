use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_account, parse_coin, parse_window, AppState};
use crate::db::TradeStore;
use crate::domain::LedgerEntry;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerQuery {
    pub account: String,
    pub coin: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResponse {
    pub entries: Vec<LedgerRowDto>,
}

/// One ledger row with decimals in canonical string form.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRowDto {
    pub time_ms: i64,
    pub coin: String,
    pub oid: i64,
    pub tid: Option<i64>,
    pub side: String,
    pub px: String,
    pub sz: String,
    pub start_position: String,
    pub direction: String,
    pub closed_pnl: String,
    pub exchange_fee: String,
    pub bot_fee: String,
    pub open_long: String,
    pub close_long: String,
    pub remaining_long: String,
    pub fee_reserve_long: String,
    pub open_short: String,
    pub close_short: String,
    pub remaining_short: String,
    pub fee_reserve_short: String,
    pub realized_fee: String,
    pub close_fee_only: Option<String>,
    pub net_pnl: String,
    pub pnl_eligible: bool,
}

impl From<&LedgerEntry> for LedgerRowDto {
    fn from(entry: &LedgerEntry) -> Self {
        let fill = &entry.fill;
        let state = &entry.state;
        Self {
            time_ms: fill.time_ms.as_ms(),
            coin: fill.coin.as_str().to_string(),
            oid: fill.oid,
            tid: fill.tid,
            side: fill.side.to_string(),
            px: fill.px.to_canonical_string(),
            sz: fill.sz.to_canonical_string(),
            start_position: fill.start_position.to_canonical_string(),
            direction: entry.direction.label(),
            closed_pnl: fill.closed_pnl.to_canonical_string(),
            exchange_fee: entry.exchange_fee.to_canonical_string(),
            bot_fee: entry.bot_fee.to_canonical_string(),
            open_long: state.open_long.to_canonical_string(),
            close_long: state.close_long.to_canonical_string(),
            remaining_long: entry.remaining_long().to_canonical_string(),
            fee_reserve_long: state.fee_reserve_long.to_canonical_string(),
            open_short: state.open_short.to_canonical_string(),
            close_short: state.close_short.to_canonical_string(),
            remaining_short: entry.remaining_short().to_canonical_string(),
            fee_reserve_short: state.fee_reserve_short.to_canonical_string(),
            realized_fee: entry.realized_fee.to_canonical_string(),
            close_fee_only: entry.close_fee_only.map(|d| d.to_canonical_string()),
            net_pnl: entry.net_pnl.to_canonical_string(),
            pnl_eligible: entry.direction.is_pnl_eligible(),
        }
    }
}

async fn load_rows(state: &AppState, params: &LedgerQuery) -> Result<Vec<LedgerRowDto>, AppError> {
    let account = parse_account(&params.account)?;
    let coin = parse_coin(params.coin.as_deref());
    let (from_ms, to_ms) = parse_window(params.from_ms, params.to_ms)?;

    let entries = state
        .repo
        .entries(&account, coin.as_ref(), from_ms, to_ms)
        .await?;

    Ok(entries.iter().map(LedgerRowDto::from).collect())
}

pub async fn get_ledger(
    Query(params): Query<LedgerQuery>,
    State(state): State<AppState>,
) -> Result<Json<LedgerResponse>, AppError> {
    let entries = load_rows(&state, &params).await?;
    Ok(Json(LedgerResponse { entries }))
}

/// Same rows as `/v1/ledger`, as CSV with a header line.
pub async fn export_ledger(
    Query(params): Query<LedgerQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let rows = load_rows(&state, &params).await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in &rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;
    }
    let body = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV export failed: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"ledger.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}
