use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{ok, ApiResponse};
use crate::db::copy_trade_repo;
use crate::errors::AppError;
use crate::execution::SizingLimits;
use crate::AppState;

#[derive(Serialize)]
pub struct ExposureView {
    pub as_of: DateTime<Utc>,
    pub exposure: Decimal,
    pub daily_cap: Decimal,
    pub remaining: Decimal,
    pub dry_run: bool,
}

/// Today's open copy exposure against the daily cap.
pub async fn today(State(state): State<AppState>) -> Result<Json<ApiResponse<ExposureView>>, AppError> {
    let now = Utc::now();
    let exposure = copy_trade_repo::today_exposure(&state.db, now).await?;
    let limits = SizingLimits::from_config(&state.config);

    Ok(ok(ExposureView {
        as_of: now,
        exposure,
        daily_cap: limits.daily_cap,
        remaining: limits.remaining_budget(exposure),
        dry_run: state.dry_run.load(Ordering::Relaxed),
    }))
}
