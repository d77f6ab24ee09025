use sqlx::PgPool;

use crate::models::{Wallet, WalletUpdate};

/// Insert a wallet or merge `update` into the existing row. `None` fields
/// keep their stored value; tracking and blacklist flags are never touched.
pub async fn upsert_wallet(
    pool: &PgPool,
    address: &str,
    update: &WalletUpdate,
) -> anyhow::Result<Wallet> {
    let score = update.score.as_ref();

    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        INSERT INTO wallets (
            address, display_name, leaderboard_pnl, leaderboard_volume, last_trade_at,
            composite_score, ev_score, roi_score, profit_factor_score,
            consistency_score, sample_score, recency_score, trade_count,
            pnl_provenance, last_scored_at
        )
        VALUES (
            $1, $2, COALESCE($3, 0), COALESCE($4, 0), $5,
            COALESCE($6, 0), COALESCE($7, 0), COALESCE($8, 0), COALESCE($9, 0),
            COALESCE($10, 0), COALESCE($11, 0), COALESCE($12, 0), COALESCE($13, 0),
            COALESCE($14, 'estimated'), CASE WHEN $6 IS NULL THEN NULL ELSE NOW() END
        )
        ON CONFLICT (address) DO UPDATE SET
            display_name        = COALESCE($2, wallets.display_name),
            leaderboard_pnl     = COALESCE($3, wallets.leaderboard_pnl),
            leaderboard_volume  = COALESCE($4, wallets.leaderboard_volume),
            last_trade_at       = COALESCE($5, wallets.last_trade_at),
            composite_score     = COALESCE($6, wallets.composite_score),
            ev_score            = COALESCE($7, wallets.ev_score),
            roi_score           = COALESCE($8, wallets.roi_score),
            profit_factor_score = COALESCE($9, wallets.profit_factor_score),
            consistency_score   = COALESCE($10, wallets.consistency_score),
            sample_score        = COALESCE($11, wallets.sample_score),
            recency_score       = COALESCE($12, wallets.recency_score),
            trade_count         = COALESCE($13, wallets.trade_count),
            pnl_provenance      = COALESCE($14, wallets.pnl_provenance),
            last_scored_at      = CASE WHEN $6 IS NULL THEN wallets.last_scored_at ELSE NOW() END,
            updated_at          = NOW()
        RETURNING *
        "#,
    )
    .bind(address)
    .bind(&update.display_name)
    .bind(update.leaderboard_pnl)
    .bind(update.leaderboard_volume)
    .bind(update.last_trade_at)
    .bind(score.map(|s| s.composite))
    .bind(score.map(|s| s.ev_score))
    .bind(score.map(|s| s.roi_score))
    .bind(score.map(|s| s.profit_factor_score))
    .bind(score.map(|s| s.consistency_score))
    .bind(score.map(|s| s.sample_score))
    .bind(score.map(|s| s.recency_score))
    .bind(score.map(|s| s.trade_count))
    .bind(score.map(|s| s.provenance.as_str()))
    .fetch_one(pool)
    .await?;

    Ok(wallet)
}

/// Fetch a wallet by its address.
pub async fn get_wallet(pool: &PgPool, address: &str) -> anyhow::Result<Option<Wallet>> {
    let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE address = $1")
        .bind(address)
        .fetch_optional(pool)
        .await?;

    Ok(wallet)
}

/// Tracked wallets, best score first.
pub async fn get_tracked_wallets(pool: &PgPool) -> anyhow::Result<Vec<Wallet>> {
    let wallets = sqlx::query_as::<_, Wallet>(
        r#"
        SELECT * FROM wallets
        WHERE is_tracked AND NOT is_blacklisted
        ORDER BY composite_score DESC, address
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(wallets)
}

/// Every wallet that may still be scored (not blacklisted).
pub async fn get_scoring_candidates(pool: &PgPool) -> anyhow::Result<Vec<Wallet>> {
    let wallets = sqlx::query_as::<_, Wallet>(
        "SELECT * FROM wallets WHERE NOT is_blacklisted ORDER BY leaderboard_pnl DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(wallets)
}

/// Wallet listing for the status API.
pub async fn list_wallets(
    pool: &PgPool,
    tracked_only: bool,
    limit: i64,
) -> anyhow::Result<Vec<Wallet>> {
    let wallets = sqlx::query_as::<_, Wallet>(
        r#"
        SELECT * FROM wallets
        WHERE ($1 = FALSE OR is_tracked)
        ORDER BY composite_score DESC, address
        LIMIT $2
        "#,
    )
    .bind(tracked_only)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(wallets)
}

/// Replace the tracked set with the top `limit` non-blacklisted wallets
/// scoring at least `min_score`. Runs in one transaction.
pub async fn select_tracked(
    pool: &PgPool,
    limit: i64,
    min_score: rust_decimal::Decimal,
) -> anyhow::Result<Vec<Wallet>> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE wallets SET is_tracked = FALSE, updated_at = NOW() WHERE is_tracked")
        .execute(&mut *tx)
        .await?;

    let mut tracked = sqlx::query_as::<_, Wallet>(
        r#"
        UPDATE wallets
        SET is_tracked = TRUE, updated_at = NOW()
        WHERE address IN (
            SELECT address FROM wallets
            WHERE NOT is_blacklisted AND composite_score >= $2
            ORDER BY composite_score DESC, address
            LIMIT $1
        )
        RETURNING *
        "#,
    )
    .bind(limit)
    .bind(min_score)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    tracked.sort_by(|a, b| {
        b.composite_score
            .cmp(&a.composite_score)
            .then_with(|| a.address.cmp(&b.address))
    });
    Ok(tracked)
}

/// Blacklist a wallet and drop it from tracking. Returns false if it was
/// already blacklisted; the first reason is kept.
pub async fn blacklist_wallet(pool: &PgPool, address: &str, reason: &str) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE wallets
        SET is_blacklisted = TRUE,
            is_tracked = FALSE,
            blacklist_reason = $2,
            blacklisted_at = NOW(),
            updated_at = NOW()
        WHERE address = $1 AND NOT is_blacklisted
        "#,
    )
    .bind(address)
    .bind(reason)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Count of wallets by state, for the health endpoint.
pub async fn count_wallets(pool: &PgPool) -> anyhow::Result<(i64, i64, i64)> {
    let row: (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE is_tracked),
            COUNT(*) FILTER (WHERE is_blacklisted)
        FROM wallets
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(row)
}
