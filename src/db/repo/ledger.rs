//! Ledger row operations for the repository.

use crate::db::store::{CoinState, StoreError, SumField};
use crate::domain::{
    AccumulatorState, Address, Coin, Decimal, Direction, Fill, LedgerEntry, Liquidation, Side,
    TimeMs,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashSet;

use super::Repository;

const ENTRY_COLUMNS: &str = r#"
    account, oid, tid, coin, time_ms, px, sz, side, start_position, closed_pnl, fee, dir,
    liquidation_method, liquidated_user, liquidation_mark_px, direction_detail,
    exchange_fee, bot_fee, open_long, close_long, fee_reserve_long,
    open_short, close_short, fee_reserve_short, realized_fee, close_fee_only, net_pnl
"#;

fn decimal_col(row: &SqliteRow, column: &str) -> Result<Decimal, StoreError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str_canonical(&raw)
        .map_err(|e| StoreError::Corrupt(format!("{} = {:?}: {}", column, raw, e)))
}

fn optional_decimal_col(row: &SqliteRow, column: &str) -> Result<Option<Decimal>, StoreError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        Decimal::from_str_canonical(&s)
            .map_err(|e| StoreError::Corrupt(format!("{} = {:?}: {}", column, s, e)))
    })
    .transpose()
}

fn state_from_row(row: &SqliteRow) -> Result<AccumulatorState, StoreError> {
    Ok(AccumulatorState {
        open_long: decimal_col(row, "open_long")?,
        close_long: decimal_col(row, "close_long")?,
        fee_reserve_long: decimal_col(row, "fee_reserve_long")?,
        open_short: decimal_col(row, "open_short")?,
        close_short: decimal_col(row, "close_short")?,
        fee_reserve_short: decimal_col(row, "fee_reserve_short")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, StoreError> {
    let side_str: String = row.try_get("side")?;
    let side = Side::from_venue_code(&side_str)
        .ok_or_else(|| StoreError::Corrupt(format!("side = {:?}", side_str)))?;

    let detail: String = row.try_get("direction_detail")?;
    let direction: Direction = serde_json::from_str(&detail)
        .map_err(|e| StoreError::Corrupt(format!("direction_detail = {:?}: {}", detail, e)))?;

    let liquidation = row
        .try_get::<Option<String>, _>("liquidation_method")?
        .map(|method| -> Result<Liquidation, StoreError> {
            Ok(Liquidation {
                method,
                liquidated_user: row
                    .try_get::<Option<String>, _>("liquidated_user")?
                    .map(Address::new),
                mark_px: optional_decimal_col(row, "liquidation_mark_px")?,
            })
        })
        .transpose()?;

    let fill = Fill {
        oid: row.try_get("oid")?,
        tid: row.try_get("tid")?,
        coin: Coin::new(row.try_get("coin")?),
        time_ms: TimeMs::new(row.try_get("time_ms")?),
        px: decimal_col(row, "px")?,
        sz: decimal_col(row, "sz")?,
        side,
        start_position: decimal_col(row, "start_position")?,
        closed_pnl: decimal_col(row, "closed_pnl")?,
        fee: decimal_col(row, "fee")?,
        dir: row.try_get("dir")?,
        liquidation,
    };

    Ok(LedgerEntry {
        account: Address::new(row.try_get("account")?),
        fill,
        direction,
        exchange_fee: decimal_col(row, "exchange_fee")?,
        bot_fee: decimal_col(row, "bot_fee")?,
        state: state_from_row(row)?,
        realized_fee: decimal_col(row, "realized_fee")?,
        close_fee_only: optional_decimal_col(row, "close_fee_only")?,
        net_pnl: decimal_col(row, "net_pnl")?,
    })
}

impl Repository {
    /// Insert a ledger row idempotently.
    ///
    /// Returns `true` if the row was new. The unique (account, dedup_key)
    /// constraint makes concurrent retries harmless.
    pub async fn insert_ledger_entry(&self, entry: &LedgerEntry) -> Result<bool, StoreError> {
        let detail = serde_json::to_string(&entry.direction)
            .map_err(|e| StoreError::Corrupt(format!("direction: {}", e)))?;
        let fill = &entry.fill;
        let liquidation = fill.liquidation.as_ref();

        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                account, dedup_key, oid, tid, coin, time_ms, px, sz, side, start_position,
                closed_pnl, fee, dir, liquidation_method, liquidated_user, liquidation_mark_px,
                direction, direction_detail, exchange_fee, bot_fee,
                open_long, close_long, remaining_long, fee_reserve_long,
                open_short, close_short, remaining_short, fee_reserve_short,
                realized_fee, close_fee_only, net_pnl, pnl_eligible, created_at
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?, ?, ?,
                ?, ?, ?, ?,
                ?, ?, ?, ?,
                ?, ?, ?, ?,
                ?, ?, ?, ?, ?
            )
            ON CONFLICT(account, dedup_key) DO NOTHING
            "#,
        )
        .bind(entry.account.as_str())
        .bind(entry.dedup_key().digest())
        .bind(fill.oid)
        .bind(fill.tid)
        .bind(fill.coin.as_str())
        .bind(fill.time_ms.as_ms())
        .bind(fill.px.to_canonical_string())
        .bind(fill.sz.to_canonical_string())
        .bind(fill.side.to_string())
        .bind(fill.start_position.to_canonical_string())
        .bind(fill.closed_pnl.to_canonical_string())
        .bind(fill.fee.to_canonical_string())
        .bind(fill.dir.as_deref())
        .bind(liquidation.map(|l| l.method.as_str()))
        .bind(liquidation.and_then(|l| l.liquidated_user.as_ref().map(|u| u.as_str())))
        .bind(liquidation.and_then(|l| l.mark_px.map(|p| p.to_canonical_string())))
        .bind(entry.direction.label())
        .bind(detail)
        .bind(entry.exchange_fee.to_canonical_string())
        .bind(entry.bot_fee.to_canonical_string())
        .bind(entry.state.open_long.to_canonical_string())
        .bind(entry.state.close_long.to_canonical_string())
        .bind(entry.remaining_long().to_canonical_string())
        .bind(entry.state.fee_reserve_long.to_canonical_string())
        .bind(entry.state.open_short.to_canonical_string())
        .bind(entry.state.close_short.to_canonical_string())
        .bind(entry.remaining_short().to_canonical_string())
        .bind(entry.state.fee_reserve_short.to_canonical_string())
        .bind(entry.realized_fee.to_canonical_string())
        .bind(entry.close_fee_only.map(|d| d.to_canonical_string()))
        .bind(entry.net_pnl.to_canonical_string())
        .bind(entry.direction.is_pnl_eligible())
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Accumulator state stored on the most recently inserted row for (account, coin).
    pub async fn get_latest_state(
        &self,
        account: &Address,
        coin: &Coin,
    ) -> Result<Option<AccumulatorState>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT open_long, close_long, fee_reserve_long,
                   open_short, close_short, fee_reserve_short
            FROM ledger_entries
            WHERE account = ? AND coin = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(account.as_str())
        .bind(coin.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(state_from_row).transpose()
    }

    pub async fn get_max_time_ms(&self, account: &Address) -> Result<Option<TimeMs>, StoreError> {
        let row = sqlx::query("SELECT MAX(time_ms) AS max_time FROM ledger_entries WHERE account = ?")
            .bind(account.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get::<Option<i64>, _>("max_time")?.map(TimeMs::new))
    }

    pub async fn query_dedup_keys_since(
        &self,
        account: &Address,
        since: TimeMs,
    ) -> Result<HashSet<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT dedup_key FROM ledger_entries WHERE account = ? AND time_ms >= ?",
        )
        .bind(account.as_str())
        .bind(since.as_ms())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("dedup_key").map_err(StoreError::from))
            .collect()
    }

    /// Sum a decimal column over PnL-eligible rows.
    ///
    /// SQLite's SUM works on REAL, so rows are fetched and summed as decimals.
    pub async fn sum_eligible(
        &self,
        account: &Address,
        field: SumField,
        since: Option<TimeMs>,
    ) -> Result<Decimal, StoreError> {
        let column = field.column();
        let sql = format!(
            "SELECT {column} FROM ledger_entries \
             WHERE account = ? AND pnl_eligible = 1 AND time_ms >= ? \
             ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(account.as_str())
            .bind(since.unwrap_or_default().as_ms())
            .fetch_all(&self.pool)
            .await?;

        let mut sum = Decimal::zero();
        for row in &rows {
            let value = decimal_col(row, column)?;
            sum = sum
                .checked_add(value)
                .ok_or_else(|| StoreError::Corrupt(format!("{} sum overflows", column)))?;
        }
        Ok(sum)
    }

    pub async fn count_eligible_entries(
        &self,
        account: &Address,
        since: Option<TimeMs>,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM ledger_entries
            WHERE account = ? AND pnl_eligible = 1 AND time_ms >= ?
            "#,
        )
        .bind(account.as_str())
        .bind(since.unwrap_or_default().as_ms())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("n")?)
    }

    /// Query ledger rows with optional coin and time window, in insertion order.
    pub async fn query_entries(
        &self,
        account: &Address,
        coin: Option<&Coin>,
        from_ms: Option<TimeMs>,
        to_ms: Option<TimeMs>,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let from_ms = from_ms.unwrap_or(TimeMs::new(0)).as_ms();
        let to_ms = to_ms.unwrap_or(TimeMs::new(i64::MAX)).as_ms();

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
             WHERE account = ? AND (? IS NULL OR coin = ?) AND time_ms >= ? AND time_ms <= ? \
             ORDER BY id ASC"
        );
        let coin = coin.map(|c| c.as_str());
        let rows = sqlx::query(&sql)
            .bind(account.as_str())
            .bind(coin)
            .bind(coin)
            .bind(from_ms)
            .bind(to_ms)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Latest state per coin for an account.
    pub async fn query_latest_states(&self, account: &Address) -> Result<Vec<CoinState>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT le.coin, le.time_ms,
                   le.open_long, le.close_long, le.fee_reserve_long,
                   le.open_short, le.close_short, le.fee_reserve_short
            FROM ledger_entries le
            WHERE le.account = ?
              AND le.id = (
                  SELECT MAX(inner_le.id) FROM ledger_entries inner_le
                  WHERE inner_le.account = le.account AND inner_le.coin = le.coin
              )
            ORDER BY le.coin ASC
            "#,
        )
        .bind(account.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<CoinState, StoreError> {
                Ok(CoinState {
                    coin: Coin::new(row.try_get("coin")?),
                    state: state_from_row(row)?,
                    last_fill_ms: TimeMs::new(row.try_get("time_ms")?),
                })
            })
            .collect()
    }
}
