use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use crate::polymarket::types::ApiUserTrade;

/// Database row for the raw_trades table: one historical fill.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RawTrade {
    pub id: Uuid,
    pub wallet_address: String,
    pub market_id: String,
    pub outcome: String,
    pub side: String,
    pub size: Decimal,
    pub price: Decimal,
    pub usd_value: Decimal,
    pub traded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RawTrade {
    pub fn is_buy(&self) -> bool {
        self.side.eq_ignore_ascii_case("BUY")
    }

    /// Convert a trade-feed row for `wallet`. Rows missing a market, side,
    /// size, price or timestamp are dropped.
    pub fn from_api(wallet: &str, t: &ApiUserTrade, now: DateTime<Utc>) -> Option<Self> {
        let market_id = t.condition_id.clone().filter(|m| !m.is_empty())?;
        let side = t
            .side
            .as_deref()
            .and_then(crate::models::Side::from_api_str)?;
        let size = t.size.filter(|s| *s > Decimal::ZERO)?;
        let price = t.price.filter(|p| *p > Decimal::ZERO)?;
        let traded_at = t.traded_at()?;

        Some(Self {
            id: Uuid::new_v4(),
            wallet_address: wallet.to_string(),
            market_id,
            outcome: t.outcome.clone().unwrap_or_default(),
            side: side.as_str().to_string(),
            size,
            price,
            usd_value: size * price,
            traded_at,
            created_at: now,
        })
    }
}

/// Where a P&L figure came from. The trade feed carries no per-trade P&L, so
/// most figures are derived from the leaderboard aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PnlProvenance {
    /// Derived from matched buy/sell fills of the wallet itself.
    Measured,
    /// Aggregate ROI used as a per-trade proxy.
    Estimated,
}

impl PnlProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            PnlProvenance::Measured => "measured",
            PnlProvenance::Estimated => "estimated",
        }
    }
}

impl fmt::Display for PnlProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
