use crate::api::{parse_account, AppState};
use crate::db::TradeStore;
use crate::error::AppError;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsQuery {
    pub account: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsResponse {
    pub positions: Vec<PositionDto>,
}

/// Open exposure of one coin according to the ledger.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
    pub coin: String,
    pub remaining_long: String,
    pub remaining_short: String,
    pub fee_reserve_long: String,
    pub fee_reserve_short: String,
    pub last_fill_ms: i64,
}

pub async fn get_positions(
    Query(params): Query<PositionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<PositionsResponse>, AppError> {
    let account = parse_account(&params.account)?;

    let states = state.repo.latest_states(&account).await?;

    let positions = states
        .into_iter()
        .filter(|s| !s.state.is_flat())
        .map(|s| PositionDto {
            coin: s.coin.as_str().to_string(),
            remaining_long: s.state.remaining_long().to_canonical_string(),
            remaining_short: s.state.remaining_short().to_canonical_string(),
            fee_reserve_long: s.state.fee_reserve_long.to_canonical_string(),
            fee_reserve_short: s.state.fee_reserve_short.to_canonical_string(),
            last_fill_ms: s.last_fill_ms.as_ms(),
        })
        .collect();

    Ok(Json(PositionsResponse { positions }))
}
