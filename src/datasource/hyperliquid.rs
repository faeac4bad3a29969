//! Hyperliquid API client implementation.

use super::{DataSource, DataSourceError};
use crate::domain::{Address, Coin, Decimal, Fill, Liquidation, Side, TimeMs};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Hyperliquid data source using the public Info API.
#[derive(Debug, Clone)]
pub struct HyperliquidDataSource {
    client: Client,
    base_url: String,
}

impl HyperliquidDataSource {
    /// Create a new Hyperliquid data source.
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_info(
        &self,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, DataSourceError> {
        let url = format!("{}/info", self.base_url);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let classify = |e: DataSourceError| {
                if e.is_transient() {
                    warn!(url = %url, error = %e, "Info request failed, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            };

            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| classify(DataSourceError::NetworkError(e.to_string())))?;

            let status = response.status();
            if !status.is_success() {
                return Err(classify(DataSourceError::from_status(status.as_u16())));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| classify(DataSourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl DataSource for HyperliquidDataSource {
    async fn fetch_fills(&self, account: &Address) -> Result<Vec<Fill>, DataSourceError> {
        debug!(account = %account, "Fetching fills");

        let payload = serde_json::json!({
            "type": "userFills",
            "user": account.as_str(),
        });

        let response = self.post_info(payload).await?;

        let fills_json = response
            .as_array()
            .ok_or_else(|| DataSourceError::ParseError("Expected array response".to_string()))?;

        let mut fills = Vec::with_capacity(fills_json.len());
        for fill_json in fills_json {
            match parse_fill(fill_json) {
                Ok(fill) => fills.push(fill),
                Err(e) => {
                    warn!(account = %account, raw = %fill_json, error = %e, "Rejecting malformed fill");
                }
            }
        }

        debug!(account = %account, count = fills.len(), "Fetched fills");
        Ok(fills)
    }
}

fn decimal_field(json: &serde_json::Value, name: &str) -> Result<Decimal, DataSourceError> {
    let value = json
        .get(name)
        .ok_or_else(|| DataSourceError::ParseError(format!("Missing {} field", name)))?;
    let parsed = match value {
        serde_json::Value::String(s) => Decimal::from_str_canonical(s),
        serde_json::Value::Number(n) => Decimal::from_str_canonical(&n.to_string()),
        _ => {
            return Err(DataSourceError::ParseError(format!(
                "Invalid {}: {}",
                name, value
            )))
        }
    };
    parsed.map_err(|e| DataSourceError::ParseError(format!("Invalid {}: {}", name, e)))
}

fn int_field(json: &serde_json::Value, name: &str) -> Option<i64> {
    match json.get(name)? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_liquidation(json: &serde_json::Value) -> Option<Liquidation> {
    let liq = json.get("liquidation").filter(|v| v.is_object())?;
    Some(Liquidation {
        method: liq
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        liquidated_user: liq
            .get("liquidatedUser")
            .and_then(|v| v.as_str())
            .map(|s| Address::new(s.to_string())),
        mark_px: decimal_field(liq, "markPx").ok(),
    })
}

pub(crate) fn parse_fill(fill_json: &serde_json::Value) -> Result<Fill, DataSourceError> {
    let time_ms = int_field(fill_json, "time")
        .ok_or_else(|| DataSourceError::ParseError("Missing time field".to_string()))?;

    let oid = int_field(fill_json, "oid")
        .ok_or_else(|| DataSourceError::ParseError("Missing oid field".to_string()))?;

    let coin = fill_json
        .get("coin")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DataSourceError::ParseError("Missing coin field".to_string()))?;

    let side_str = fill_json
        .get("side")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DataSourceError::ParseError("Missing side field".to_string()))?;
    let side = Side::from_venue_code(side_str)
        .ok_or_else(|| DataSourceError::ParseError(format!("Invalid side: {}", side_str)))?;

    Ok(Fill {
        oid,
        tid: int_field(fill_json, "tid"),
        coin: Coin::new(coin.to_string()),
        time_ms: TimeMs::new(time_ms),
        px: decimal_field(fill_json, "px")?,
        sz: decimal_field(fill_json, "sz")?,
        side,
        start_position: decimal_field(fill_json, "startPosition")?,
        closed_pnl: decimal_field(fill_json, "closedPnl")?,
        fee: decimal_field(fill_json, "fee")?,
        dir: fill_json
            .get("dir")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        liquidation: parse_liquidation(fill_json),
    })
}
