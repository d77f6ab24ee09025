use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Leaderboard (Data API)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLeaderboardEntry {
    #[serde(default, alias = "proxy_wallet")]
    pub proxy_wallet: Option<String>,
    #[serde(default, alias = "user_name")]
    pub user_name: Option<String>,
    #[serde(default)]
    pub pnl: Option<Decimal>,
    #[serde(default, alias = "volume")]
    pub vol: Option<Decimal>,
    #[serde(default)]
    pub rank: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Open positions (Data API)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPosition {
    #[serde(default)]
    pub proxy_wallet: Option<String>,
    /// Outcome token id.
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub avg_price: Option<Decimal>,
    #[serde(default)]
    pub cur_price: Option<Decimal>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

// ---------------------------------------------------------------------------
// Trade history (Data API)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUserTrade {
    #[serde(default)]
    pub proxy_wallet: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl ApiUserTrade {
    pub fn traded_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.timestamp.as_ref())
    }
}

/// Timestamps arrive as seconds, milliseconds, numeric strings or RFC 3339.
pub fn parse_timestamp(ts: Option<&serde_json::Value>) -> Option<DateTime<Utc>> {
    fn from_epoch(secs: i64) -> Option<DateTime<Utc>> {
        // If >1e12, it's milliseconds
        if secs > 1_000_000_000_000 {
            DateTime::from_timestamp(secs / 1000, ((secs % 1000) * 1_000_000) as u32)
        } else {
            DateTime::from_timestamp(secs, 0)
        }
    }

    ts.and_then(|t| match t {
        serde_json::Value::Number(n) => from_epoch(n.as_i64()?),
        serde_json::Value::String(s) => {
            if let Ok(secs) = s.parse::<i64>() {
                return from_epoch(secs);
            }
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    })
}
