use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::RawTrade;

/// Insert a raw fill. Duplicates of an already-stored fill are ignored;
/// returns whether a row was written.
pub async fn insert_raw_trade(pool: &PgPool, trade: &RawTrade) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO raw_trades (wallet_address, market_id, outcome, side, size, price, usd_value, traded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT ON CONSTRAINT raw_trades_dedupe DO NOTHING
        "#,
    )
    .bind(&trade.wallet_address)
    .bind(&trade.market_id)
    .bind(&trade.outcome)
    .bind(&trade.side)
    .bind(trade.size)
    .bind(trade.price)
    .bind(trade.usd_value)
    .bind(trade.traded_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Most recent `limit` fills for a wallet, newest first.
pub async fn get_recent_trades(
    pool: &PgPool,
    wallet: &str,
    limit: i64,
) -> anyhow::Result<Vec<RawTrade>> {
    let trades = sqlx::query_as::<_, RawTrade>(
        r#"
        SELECT * FROM raw_trades
        WHERE wallet_address = $1
        ORDER BY traded_at DESC
        LIMIT $2
        "#,
    )
    .bind(wallet)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(trades)
}

/// Fills for a wallet since `since`, oldest first. Used by the backtester.
pub async fn get_trades_since(
    pool: &PgPool,
    wallet: &str,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<RawTrade>> {
    let trades = sqlx::query_as::<_, RawTrade>(
        r#"
        SELECT * FROM raw_trades
        WHERE wallet_address = $1 AND traded_at >= $2
        ORDER BY traded_at ASC
        "#,
    )
    .bind(wallet)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(trades)
}
