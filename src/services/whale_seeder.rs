use std::collections::HashMap;

use chrono::Utc;
use metrics::gauge;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::{trade_repo, wallet_repo};
use crate::intelligence::score_wallet;
use crate::models::{RawTrade, Wallet, WalletUpdate};
use crate::polymarket::{ApiLeaderboardEntry, DataClient};

const LEADERBOARD_ORDER_BY: &str = "PNL";

/// One leaderboard wallet after merging every category/period it appeared in.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardCandidate {
    pub address: String,
    pub display_name: Option<String>,
    pub pnl: Decimal,
    pub volume: Decimal,
}

/// Merge leaderboard rows by address. The row with the highest P&L wins;
/// a missing display name is filled from any other row.
pub fn dedupe_leaderboard(entries: Vec<ApiLeaderboardEntry>) -> Vec<LeaderboardCandidate> {
    let mut by_address: HashMap<String, LeaderboardCandidate> = HashMap::new();

    for entry in entries {
        let Some(address) = entry.proxy_wallet.filter(|a| !a.is_empty()) else {
            continue;
        };
        let candidate = LeaderboardCandidate {
            address: address.to_lowercase(),
            display_name: entry.user_name.filter(|n| !n.is_empty()),
            pnl: entry.pnl.unwrap_or(Decimal::ZERO),
            volume: entry.vol.unwrap_or(Decimal::ZERO),
        };

        match by_address.get_mut(&candidate.address) {
            Some(existing) => {
                let name = existing.display_name.take().or(candidate.display_name.clone());
                if candidate.pnl > existing.pnl {
                    *existing = candidate;
                }
                if existing.display_name.is_none() {
                    existing.display_name = name;
                }
            }
            None => {
                by_address.insert(candidate.address.clone(), candidate);
            }
        }
    }

    let mut out: Vec<LeaderboardCandidate> = by_address.into_values().collect();
    out.sort_by(|a, b| b.pnl.cmp(&a.pnl).then_with(|| a.address.cmp(&b.address)));
    out
}

/// Pull the leaderboard across every configured category and period and
/// upsert the deduplicated wallets. Returns how many were stored.
pub async fn seed_from_leaderboard(
    data_client: &DataClient,
    pool: &PgPool,
    config: &AppConfig,
) -> anyhow::Result<usize> {
    let mut rows = Vec::new();
    let mut pages_ok = 0usize;

    for category in &config.leaderboard_categories {
        for period in &config.leaderboard_periods {
            match data_client
                .get_leaderboard(category, period, LEADERBOARD_ORDER_BY, config.leaderboard_top_n)
                .await
            {
                Ok(page) => {
                    tracing::debug!(category = %category, period = %period, rows = page.len(), "Leaderboard page fetched");
                    pages_ok += 1;
                    rows.extend(page);
                }
                Err(e) => {
                    tracing::warn!(category = %category, period = %period, error = %e, "Failed to fetch leaderboard page");
                }
            }
        }
    }

    if pages_ok == 0 {
        anyhow::bail!("no leaderboard page could be fetched");
    }

    let candidates = dedupe_leaderboard(rows);
    let mut stored = 0usize;
    for c in &candidates {
        let update = WalletUpdate::from_leaderboard(c.display_name.clone(), c.pnl, c.volume);
        match wallet_repo::upsert_wallet(pool, &c.address, &update).await {
            Ok(_) => stored += 1,
            Err(e) => tracing::warn!(wallet = %c.address, error = %e, "Failed to upsert wallet"),
        }
    }

    tracing::info!(
        pages = pages_ok,
        candidates = candidates.len(),
        stored,
        "Leaderboard seeded"
    );
    Ok(stored)
}

/// Refresh each non-blacklisted wallet's trade history and score.
/// Returns how many wallets were scored.
pub async fn score_wallets(
    data_client: &DataClient,
    pool: &PgPool,
    config: &AppConfig,
) -> anyhow::Result<usize> {
    let wallets = wallet_repo::get_scoring_candidates(pool).await?;
    let mut scored = 0usize;

    for wallet in &wallets {
        match score_one(data_client, pool, config, wallet).await {
            Ok(()) => scored += 1,
            Err(e) => {
                tracing::warn!(wallet = %wallet.address, error = %e, "Failed to score wallet");
            }
        }
    }

    tracing::info!(candidates = wallets.len(), scored, "Wallets scored");
    Ok(scored)
}

async fn score_one(
    data_client: &DataClient,
    pool: &PgPool,
    config: &AppConfig,
    wallet: &Wallet,
) -> anyhow::Result<()> {
    let now = Utc::now();

    let fetched: Vec<RawTrade> = match data_client
        .get_user_trades(&wallet.address, config.score_history_limit)
        .await
    {
        Ok(rows) => rows
            .iter()
            .filter_map(|t| RawTrade::from_api(&wallet.address, t, now))
            .collect(),
        Err(e) => {
            tracing::debug!(wallet = %wallet.address, error = %e, "Trade history unavailable, scoring stored history");
            Vec::new()
        }
    };

    let mut inserted = 0usize;
    for trade in &fetched {
        match trade_repo::insert_raw_trade(pool, trade).await {
            Ok(true) => inserted += 1,
            Ok(false) => {}
            Err(e) => tracing::debug!(wallet = %wallet.address, error = %e, "Failed to store raw trade"),
        }
    }

    let sample = match trade_repo::get_recent_trades(pool, &wallet.address, config.score_history_limit as i64).await {
        Ok(stored) if !stored.is_empty() => stored,
        Ok(_) => fetched,
        Err(e) => {
            tracing::warn!(wallet = %wallet.address, error = %e, "Failed to read stored history, scoring fetched sample");
            fetched
        }
    };

    let score = score_wallet(&sample, wallet.leaderboard_pnl, wallet.leaderboard_volume, now);
    tracing::debug!(
        wallet = %wallet.address,
        trades = sample.len(),
        new_trades = inserted,
        composite = %score.composite,
        provenance = %score.provenance,
        insufficient = score.insufficient_data,
        "Wallet scored"
    );

    let last_trade_at = score.last_trade_at;
    wallet_repo::upsert_wallet(pool, &wallet.address, &WalletUpdate::scored(score, last_trade_at)).await?;
    Ok(())
}

/// Mark the top scorers tracked and untrack everyone else.
pub async fn select_tracked(pool: &PgPool, config: &AppConfig) -> anyhow::Result<Vec<Wallet>> {
    let tracked =
        wallet_repo::select_tracked(pool, config.max_tracked_wallets, config.min_score_to_track).await?;
    gauge!("tracked_wallets").set(tracked.len() as f64);

    tracing::info!(
        tracked = tracked.len(),
        max = config.max_tracked_wallets,
        min_score = %config.min_score_to_track,
        top = tracked.first().map(|w| w.address.as_str()).unwrap_or("-"),
        "Tracked set selected"
    );
    Ok(tracked)
}

/// Seed, score and select in one pass. A failed seed still scores and
/// selects from what the store already holds.
pub async fn run_discovery(
    data_client: &DataClient,
    pool: &PgPool,
    config: &AppConfig,
) -> anyhow::Result<Vec<Wallet>> {
    if let Err(e) = seed_from_leaderboard(data_client, pool, config).await {
        tracing::error!(error = %e, "Leaderboard seeding failed, continuing with stored wallets");
    }
    score_wallets(data_client, pool, config).await?;
    select_tracked(pool, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(raw: serde_json::Value) -> ApiLeaderboardEntry {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_dedupe_keeps_best_row_per_wallet() {
        let rows = vec![
            entry(json!({ "proxyWallet": "0xAAA", "userName": "alpha", "pnl": 100, "vol": 5000 })),
            entry(json!({ "proxyWallet": "0xaaa", "pnl": 900, "vol": 20000 })),
            entry(json!({ "proxyWallet": "0xBBB", "pnl": 500 })),
            entry(json!({ "pnl": 10_000 })),
        ];

        let out = dedupe_leaderboard(rows);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].address, "0xaaa");
        assert_eq!(out[0].pnl, Decimal::from(900));
        assert_eq!(out[0].volume, Decimal::from(20_000));
        assert_eq!(out[0].display_name.as_deref(), Some("alpha"));
        assert_eq!(out[1].address, "0xbbb");
        assert_eq!(out[1].volume, Decimal::ZERO);
    }

    #[test]
    fn test_dedupe_empty() {
        assert!(dedupe_leaderboard(Vec::new()).is_empty());
    }
}
