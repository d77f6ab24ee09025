use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for the copy_trades table.
///
/// `size` is the USD committed; `shares` is what was ordered at `entry_price`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CopyTrade {
    pub id: Uuid,
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
    pub status: String,
    pub order_id: Option<String>,
    pub error_message: Option<String>,
    pub exit_price: Option<Decimal>,
    pub exited_at: Option<DateTime<Utc>>,
    pub realized_pnl: Option<Decimal>,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl CopyTrade {
    pub fn is_open(&self) -> bool {
        self.status == copy_status::PENDING || self.status == copy_status::FILLED
    }

    /// Realized P&L if the position were closed at `exit_price`.
    pub fn pnl_at(&self, exit_price: Decimal) -> Decimal {
        self.shares * (exit_price - self.entry_price)
    }
}

/// Copy trade status constants.
pub mod copy_status {
    pub const PENDING: &str = "pending";
    pub const FILLED: &str = "filled";
    pub const FAILED: &str = "failed";
    pub const WON: &str = "won";
    pub const LOST: &str = "lost";
}

/// A wallet's resolved copy history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CopyRecord {
    pub wins: i64,
    pub losses: i64,
    pub realized_pnl: Decimal,
}

impl CopyRecord {
    pub fn resolved(&self) -> i64 {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> Option<Decimal> {
        let resolved = self.resolved();
        if resolved == 0 {
            return None;
        }
        Some(Decimal::from(self.wins) / Decimal::from(resolved))
    }
}
