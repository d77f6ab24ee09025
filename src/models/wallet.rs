use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::intelligence::scorer::WalletScore;

/// Database row for the wallets table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub address: String,
    pub display_name: Option<String>,
    pub leaderboard_pnl: Decimal,
    pub leaderboard_volume: Decimal,
    pub composite_score: Decimal,
    pub ev_score: Decimal,
    pub roi_score: Decimal,
    pub profit_factor_score: Decimal,
    pub consistency_score: Decimal,
    pub sample_score: Decimal,
    pub recency_score: Decimal,
    pub trade_count: i32,
    pub pnl_provenance: String,
    pub is_tracked: bool,
    pub is_blacklisted: bool,
    pub blacklist_reason: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_scored_at: Option<DateTime<Utc>>,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub blacklisted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update for a wallet row. `None` fields are left untouched by
/// `wallet_repo::upsert_wallet`.
#[derive(Debug, Clone, Default)]
pub struct WalletUpdate {
    pub display_name: Option<String>,
    pub leaderboard_pnl: Option<Decimal>,
    pub leaderboard_volume: Option<Decimal>,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub score: Option<WalletScore>,
}

impl WalletUpdate {
    pub fn from_leaderboard(
        display_name: Option<String>,
        pnl: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            display_name,
            leaderboard_pnl: Some(pnl),
            leaderboard_volume: Some(volume),
            ..Default::default()
        }
    }

    pub fn scored(score: WalletScore, last_trade_at: Option<DateTime<Utc>>) -> Self {
        Self {
            last_trade_at,
            score: Some(score),
            ..Default::default()
        }
    }
}
