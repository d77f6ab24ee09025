use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use super::types::{ApiLeaderboardEntry, ApiPosition, ApiUserTrade};

const DATA_API_BASE: &str = "https://data-api.polymarket.com";

#[derive(Debug, Error)]
pub enum DataClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// Read-only client for the Polymarket Data API: leaderboard, open
/// positions and trade history.
#[derive(Debug, Clone)]
pub struct DataClient {
    http: Client,
    base_url: String,
}

impl DataClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: DATA_API_BASE.into(),
        }
    }

    /// Build a client whose every request carries a fixed timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, DataClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::new(http))
    }

    /// Point the client at another host (local fixtures, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch one leaderboard page for a category and time period.
    pub async fn get_leaderboard(
        &self,
        category: &str,
        period: &str,
        order_by: &str,
        limit: u32,
    ) -> Result<Vec<ApiLeaderboardEntry>, DataClientError> {
        let url = format!("{}/v1/leaderboard", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("category", category),
                ("timePeriod", period),
                ("orderBy", order_by),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let entries: Vec<ApiLeaderboardEntry> = resp.json().await?;
        Ok(entries)
    }

    /// Fetch the current open positions of a wallet.
    pub async fn get_positions(&self, wallet: &str) -> Result<Vec<ApiPosition>, DataClientError> {
        let url = format!("{}/positions", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("user", wallet), ("sizeThreshold", "0"), ("limit", "500")])
            .send()
            .await?
            .error_for_status()?;

        let positions: Vec<ApiPosition> = resp.json().await?;
        Ok(positions)
    }

    /// Fetch the most recent `limit` fills of a wallet.
    pub async fn get_user_trades(
        &self,
        wallet: &str,
        limit: u32,
    ) -> Result<Vec<ApiUserTrade>, DataClientError> {
        let url = format!("{}/trades", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("user", wallet), ("limit", &limit.to_string())])
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = resp.json().await?;
        if !body.is_array() {
            return Err(DataClientError::Unexpected(format!(
                "trades response for {wallet} is not an array"
            )));
        }

        serde_json::from_value(body).map_err(|e| DataClientError::Unexpected(e.to_string()))
    }
}
