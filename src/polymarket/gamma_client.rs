use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::position::parse_end_date;

const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";

#[derive(Debug, Error)]
pub enum GammaClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("market {0} not found")]
    NotFound(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GammaMarket {
    #[serde(alias = "conditionId")]
    pub condition_id: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default, alias = "endDate")]
    pub end_date: Option<String>,
    #[serde(default, alias = "endDateIso")]
    pub end_date_iso: Option<String>,
}

impl GammaMarket {
    /// Resolve the market's scheduled end, preferring the full timestamp.
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_date
            .as_deref()
            .and_then(parse_end_date)
            .or_else(|| self.end_date_iso.as_deref().and_then(parse_end_date))
    }
}

/// Market-metadata client. Only the end time is consumed.
#[derive(Debug, Clone)]
pub struct GammaClient {
    http: Client,
    base_url: String,
}

impl GammaClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: GAMMA_API_BASE.into(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, GammaClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(http))
    }

    /// Point the client at another host (local fixtures, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch a single market by condition ID.
    pub async fn get_market(&self, condition_id: &str) -> Result<GammaMarket, GammaClientError> {
        let url = format!("{}/markets", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("condition_ids", condition_id)])
            .send()
            .await?
            .error_for_status()?;

        let markets: Vec<GammaMarket> = resp.json().await?;
        markets
            .into_iter()
            .find(|m| m.condition_id.eq_ignore_ascii_case(condition_id))
            .ok_or_else(|| GammaClientError::NotFound(condition_id.to_string()))
    }

    /// Scheduled end time of a market, if the metadata carries one.
    pub async fn get_market_end(
        &self,
        condition_id: &str,
    ) -> Result<Option<DateTime<Utc>>, GammaClientError> {
        Ok(self.get_market(condition_id).await?.end_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_end_time_prefers_full_timestamp() {
        let market: GammaMarket = serde_json::from_value(json!({
            "conditionId": "0xabc",
            "endDate": "2030-03-01T18:00:00Z",
            "endDateIso": "2030-03-01"
        }))
        .unwrap();
        let end = market.end_time().unwrap();
        assert_eq!(end.to_rfc3339(), "2030-03-01T18:00:00+00:00");
    }

    #[test]
    fn test_end_time_falls_back_to_date() {
        let market: GammaMarket = serde_json::from_value(json!({
            "conditionId": "0xabc",
            "endDateIso": "2030-03-01"
        }))
        .unwrap();
        assert!(market.end_time().is_some());
    }
}
