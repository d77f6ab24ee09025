use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{copy_status, CopyRecord, CopyTrade};

/// Fields of a copy trade known before the order is submitted.
#[derive(Debug, Clone)]
pub struct NewCopyTrade {
    pub wallet_address: String,
    pub market_id: String,
    pub outcome: String,
    pub asset_id: String,
    pub side: String,
    pub size: Decimal,
    pub shares: Decimal,
    pub entry_price: Decimal,
    pub whale_price: Decimal,
    pub entry_slippage: Decimal,
    pub independent_count: i32,
    pub dry_run: bool,
}

/// Record a copy trade as pending. Fails if the wallet already has an open
/// copy on the market.
pub async fn insert_pending(pool: &PgPool, new: &NewCopyTrade) -> anyhow::Result<CopyTrade> {
    let trade = sqlx::query_as::<_, CopyTrade>(
        r#"
        INSERT INTO copy_trades (
            wallet_address, market_id, outcome, asset_id, side, size, shares,
            entry_price, whale_price, entry_slippage, independent_count, dry_run
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(&new.wallet_address)
    .bind(&new.market_id)
    .bind(&new.outcome)
    .bind(&new.asset_id)
    .bind(&new.side)
    .bind(new.size)
    .bind(new.shares)
    .bind(new.entry_price)
    .bind(new.whale_price)
    .bind(new.entry_slippage)
    .bind(new.independent_count)
    .bind(new.dry_run)
    .fetch_one(pool)
    .await?;

    Ok(trade)
}

/// Mark a pending copy trade as filled.
pub async fn mark_filled(pool: &PgPool, id: Uuid, order_id: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE copy_trades
        SET status = $2, order_id = $3, filled_at = NOW()
        WHERE id = $1 AND status = $4
        "#,
    )
    .bind(id)
    .bind(copy_status::FILLED)
    .bind(order_id)
    .bind(copy_status::PENDING)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a pending copy trade as failed with an error message.
pub async fn mark_failed(pool: &PgPool, id: Uuid, error_message: &str) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE copy_trades SET status = $2, error_message = $3 WHERE id = $1 AND status = $4",
    )
    .bind(id)
    .bind(copy_status::FAILED)
    .bind(error_message)
    .bind(copy_status::PENDING)
    .execute(pool)
    .await?;

    Ok(())
}

/// Close an open copy trade at `exit_price`: won if P&L is positive,
/// otherwise lost. Returns the closed row, or None if it was not open.
pub async fn close_trade(
    pool: &PgPool,
    id: Uuid,
    exit_price: Decimal,
    realized_pnl: Decimal,
    exited_at: DateTime<Utc>,
) -> anyhow::Result<Option<CopyTrade>> {
    let status = if realized_pnl > Decimal::ZERO {
        copy_status::WON
    } else {
        copy_status::LOST
    };

    let trade = sqlx::query_as::<_, CopyTrade>(
        r#"
        UPDATE copy_trades
        SET status = $2, exit_price = $3, realized_pnl = $4, exited_at = $5
        WHERE id = $1 AND status IN ($6, $7)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(exit_price)
    .bind(realized_pnl)
    .bind(exited_at)
    .bind(copy_status::PENDING)
    .bind(copy_status::FILLED)
    .fetch_optional(pool)
    .await?;

    Ok(trade)
}

/// Open copy trades on a (market, outcome), from any wallet.
pub async fn get_open_for_outcome(
    pool: &PgPool,
    market_id: &str,
    outcome: &str,
) -> anyhow::Result<Vec<CopyTrade>> {
    let trades = sqlx::query_as::<_, CopyTrade>(
        r#"
        SELECT * FROM copy_trades
        WHERE market_id = $1 AND outcome = $2 AND status IN ($3, $4)
        ORDER BY created_at
        "#,
    )
    .bind(market_id)
    .bind(outcome)
    .bind(copy_status::PENDING)
    .bind(copy_status::FILLED)
    .fetch_all(pool)
    .await?;

    Ok(trades)
}

/// The open copy trade of `wallet` on `market_id`, if any.
pub async fn get_open_for_wallet_market(
    pool: &PgPool,
    wallet: &str,
    market_id: &str,
) -> anyhow::Result<Option<CopyTrade>> {
    let trade = sqlx::query_as::<_, CopyTrade>(
        r#"
        SELECT * FROM copy_trades
        WHERE wallet_address = $1 AND market_id = $2 AND status IN ($3, $4)
        "#,
    )
    .bind(wallet)
    .bind(market_id)
    .bind(copy_status::PENDING)
    .bind(copy_status::FILLED)
    .fetch_optional(pool)
    .await?;

    Ok(trade)
}

/// Copy trades, newest first, optionally filtered by status.
pub async fn list_copy_trades(
    pool: &PgPool,
    status: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<CopyTrade>> {
    let trades = sqlx::query_as::<_, CopyTrade>(
        r#"
        SELECT * FROM copy_trades
        WHERE ($1::TEXT IS NULL OR status = $1)
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(status)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(trades)
}

/// USD committed today (UTC) in pending or filled copy trades.
pub async fn today_exposure(pool: &PgPool, now: DateTime<Utc>) -> anyhow::Result<Decimal> {
    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|d| d.and_utc())
        .unwrap_or(now);

    let row: (Option<Decimal>,) = sqlx::query_as(
        r#"
        SELECT SUM(size) FROM copy_trades
        WHERE created_at >= $1 AND status IN ($2, $3)
        "#,
    )
    .bind(day_start)
    .bind(copy_status::PENDING)
    .bind(copy_status::FILLED)
    .fetch_one(pool)
    .await?;

    Ok(row.0.unwrap_or(Decimal::ZERO))
}

/// Resolved copy history of a wallet.
pub async fn copy_record(pool: &PgPool, wallet: &str) -> anyhow::Result<CopyRecord> {
    let row: (i64, i64, Option<Decimal>) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = $2),
            COUNT(*) FILTER (WHERE status = $3),
            SUM(realized_pnl)
        FROM copy_trades
        WHERE wallet_address = $1
        "#,
    )
    .bind(wallet)
    .bind(copy_status::WON)
    .bind(copy_status::LOST)
    .fetch_one(pool)
    .await?;

    Ok(CopyRecord {
        wins: row.0,
        losses: row.1,
        realized_pnl: row.2.unwrap_or(Decimal::ZERO),
    })
}

/// Wallets that have at least `min_resolved` resolved copies.
pub async fn wallets_with_resolved_copies(
    pool: &PgPool,
    min_resolved: i64,
) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT wallet_address FROM copy_trades
        WHERE status IN ($2, $3)
        GROUP BY wallet_address
        HAVING COUNT(*) >= $1
        "#,
    )
    .bind(min_resolved)
    .bind(copy_status::WON)
    .bind(copy_status::LOST)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}
