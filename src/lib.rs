pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod execution;
pub mod intelligence;
pub mod metrics;
pub mod models;
pub mod polymarket;
pub mod services;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: AppConfig,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    /// Set when orders are simulated, including after a failed backtest.
    pub dry_run: Arc<AtomicBool>,
}
