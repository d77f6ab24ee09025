use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::polymarket::types::ApiPosition;

/// (market id, outcome): identity of a position within one wallet.
pub type PositionKey = (String, String);

/// Last-seen open position of a tracked wallet. Held in memory by the
/// position monitor only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub market_id: String,
    pub outcome: String,
    pub asset_id: String,
    pub title: Option<String>,
    pub size: Decimal,
    pub avg_price: Decimal,
    pub current_price: Decimal,
    pub end_date: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

impl PositionSnapshot {
    pub fn key(&self) -> PositionKey {
        (self.market_id.clone(), self.outcome.clone())
    }

    /// USD value of the position at its current price.
    pub fn notional(&self) -> Decimal {
        self.size * self.current_price
    }

    /// Convert a positions-feed row. Rows without a market, outcome or a
    /// positive size are dropped.
    pub fn from_api(pos: &ApiPosition, observed_at: DateTime<Utc>) -> Option<Self> {
        let market_id = pos.condition_id.clone().filter(|m| !m.is_empty())?;
        let outcome = pos.outcome.clone().filter(|o| !o.is_empty())?;
        let size = pos.size.unwrap_or(Decimal::ZERO);
        if size <= Decimal::ZERO {
            return None;
        }

        let avg_price = pos.avg_price.unwrap_or(Decimal::ZERO);
        Some(Self {
            market_id,
            outcome,
            asset_id: pos.asset.clone().unwrap_or_default(),
            title: pos.title.clone(),
            size,
            avg_price,
            current_price: pos.cur_price.unwrap_or(avg_price),
            end_date: pos.end_date.as_deref().and_then(parse_end_date),
            observed_at,
        })
    }
}

/// The feed reports end dates either as RFC 3339 or as a bare `YYYY-MM-DD`.
pub fn parse_end_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_position(size: Option<Decimal>) -> ApiPosition {
        ApiPosition {
            proxy_wallet: Some("0xabc".into()),
            asset: Some("123".into()),
            condition_id: Some("0xmarket".into()),
            size,
            avg_price: Some(Decimal::new(40, 2)),
            cur_price: Some(Decimal::new(45, 2)),
            title: Some("Will it rain?".into()),
            outcome: Some("Yes".into()),
            end_date: Some("2030-01-01".into()),
        }
    }

    #[test]
    fn test_from_api_computes_notional() {
        let snap = PositionSnapshot::from_api(&api_position(Some(Decimal::from(1000))), Utc::now())
            .expect("valid position");
        assert_eq!(snap.notional(), Decimal::from(450));
        assert_eq!(snap.key(), ("0xmarket".to_string(), "Yes".to_string()));
        assert!(snap.end_date.is_some());
    }

    #[test]
    fn test_from_api_drops_empty_positions() {
        assert!(PositionSnapshot::from_api(&api_position(Some(Decimal::ZERO)), Utc::now()).is_none());
        assert!(PositionSnapshot::from_api(&api_position(None), Utc::now()).is_none());
    }

    #[test]
    fn test_parse_end_date_formats() {
        assert!(parse_end_date("2030-06-01T12:00:00Z").is_some());
        assert!(parse_end_date("2030-06-01").is_some());
        assert!(parse_end_date("soon").is_none());
    }
}
