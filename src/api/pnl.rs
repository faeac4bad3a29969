use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{parse_account, AppState};
use crate::db::{SumField, TradeStore};
use crate::domain::{Address, Decimal, TimeMs};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlQuery {
    pub account: String,
    pub from_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlResponse {
    pub account: String,
    pub closed_pnl: String,
    pub net_pnl: String,
    pub realized_fee: String,
    pub exchange_fee: String,
    pub bot_fee: String,
    pub trade_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    pub from_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub wallets: Vec<WalletSummaryDto>,
    pub total_net_pnl: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSummaryDto {
    pub account: String,
    pub closed_pnl: String,
    pub net_pnl: String,
    pub trade_count: i64,
}

pub async fn get_pnl(
    Query(params): Query<PnlQuery>,
    State(state): State<AppState>,
) -> Result<Json<PnlResponse>, AppError> {
    let account = parse_account(&params.account)?;
    let since = params.from_ms.map(TimeMs::new);
    let repo = &state.repo;

    Ok(Json(PnlResponse {
        account: account.as_str().to_string(),
        closed_pnl: repo
            .sum_field(&account, SumField::ClosedPnl, since)
            .await?
            .to_canonical_string(),
        net_pnl: repo
            .sum_field(&account, SumField::NetPnl, since)
            .await?
            .to_canonical_string(),
        realized_fee: repo
            .sum_field(&account, SumField::RealizedFee, since)
            .await?
            .to_canonical_string(),
        exchange_fee: repo
            .sum_field(&account, SumField::ExchangeFee, since)
            .await?
            .to_canonical_string(),
        bot_fee: repo
            .sum_field(&account, SumField::BotFee, since)
            .await?
            .to_canonical_string(),
        trade_count: repo.count_eligible(&account, since).await?,
    }))
}

/// Net PnL of every monitored wallet, best first.
pub async fn get_summary(
    Query(params): Query<SummaryQuery>,
    State(state): State<AppState>,
) -> Result<Json<SummaryResponse>, AppError> {
    let since = params.from_ms.map(TimeMs::new);

    let mut rows: Vec<(Address, Decimal, Decimal, i64)> =
        Vec::with_capacity(state.config.wallets.len());
    for wallet in &state.config.wallets {
        let closed = state
            .repo
            .sum_field(wallet, SumField::ClosedPnl, since)
            .await?;
        let net = state.repo.sum_field(wallet, SumField::NetPnl, since).await?;
        let count = state.repo.count_eligible(wallet, since).await?;
        rows.push((wallet.clone(), closed, net, count));
    }
    rows.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

    let total_net_pnl = Decimal::checked_sum(rows.iter().map(|r| r.2))
        .ok_or_else(|| AppError::Internal("Total net PnL overflows".to_string()))?;

    Ok(Json(SummaryResponse {
        wallets: rows
            .into_iter()
            .map(|(account, closed, net, trade_count)| WalletSummaryDto {
                account: account.as_str().to_string(),
                closed_pnl: closed.to_canonical_string(),
                net_pnl: net.to_canonical_string(),
                trade_count,
            })
            .collect(),
        total_net_pnl: total_net_pnl.to_canonical_string(),
    }))
}
