use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::{clamp_limit, ok, ApiResponse};
use crate::db::copy_trade_repo;
use crate::errors::AppError;
use crate::models::{copy_status, CopyTrade};
use crate::AppState;

const STATUSES: &[&str] = &[
    copy_status::PENDING,
    copy_status::FILLED,
    copy_status::FAILED,
    copy_status::WON,
    copy_status::LOST,
];

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<Vec<CopyTrade>>>, AppError> {
    let status = params.status.as_deref().map(str::to_lowercase);
    if let Some(s) = status.as_deref() {
        if !STATUSES.contains(&s) {
            return Err(AppError::BadRequest(format!(
                "unknown status '{s}', expected one of {}",
                STATUSES.join(", ")
            )));
        }
    }

    let trades =
        copy_trade_repo::list_copy_trades(&state.db, status.as_deref(), clamp_limit(params.limit)).await?;
    Ok(ok(trades))
}
