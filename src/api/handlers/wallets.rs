use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{clamp_limit, ok, ApiResponse};
use crate::db::{copy_trade_repo, wallet_repo};
use crate::errors::AppError;
use crate::models::{CopyRecord, Wallet};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub tracked: Option<bool>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct WalletList {
    pub total: i64,
    pub tracked: i64,
    pub blacklisted: i64,
    pub wallets: Vec<Wallet>,
}

#[derive(Serialize)]
pub struct WalletDetail {
    #[serde(flatten)]
    pub wallet: Wallet,
    pub copy_record: CopyRecord,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<WalletList>>, AppError> {
    let (total, tracked, blacklisted) = wallet_repo::count_wallets(&state.db).await?;
    let wallets = wallet_repo::list_wallets(
        &state.db,
        params.tracked.unwrap_or(false),
        clamp_limit(params.limit),
    )
    .await?;

    Ok(ok(WalletList {
        total,
        tracked,
        blacklisted,
        wallets,
    }))
}

pub async fn tracked(State(state): State<AppState>) -> Result<Json<ApiResponse<Vec<Wallet>>>, AppError> {
    let wallets = wallet_repo::get_tracked_wallets(&state.db).await?;
    Ok(ok(wallets))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ApiResponse<WalletDetail>>, AppError> {
    let address = address.to_lowercase();
    let wallet = wallet_repo::get_wallet(&state.db, &address)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("wallet {address}")))?;
    let copy_record = copy_trade_repo::copy_record(&state.db, &address).await?;

    Ok(ok(WalletDetail { wallet, copy_record }))
}
