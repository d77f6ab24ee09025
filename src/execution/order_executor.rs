use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Side;
use crate::polymarket::gateway::GatewayError;
use crate::polymarket::OrderGateway;

use super::position_sizer::shares_for;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("order size rounds to zero shares at price {0}")]
    ZeroShares(Decimal),
}

/// Result of a placed (or simulated) order.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub order_id: String,
    pub shares: Decimal,
    pub price: Decimal,
    pub simulated: bool,
}

/// Places orders through the signing gateway, or simulates them.
///
/// Without a gateway, or while the simulation flag is set, every order is
/// logged and reported as filled at the requested price.
pub struct OrderExecutor {
    gateway: Option<OrderGateway>,
    simulate: Arc<AtomicBool>,
}

impl OrderExecutor {
    /// `simulate` is the reported starting mode; the flag only ever goes
    /// from false to true afterwards.
    pub fn new(gateway: Option<OrderGateway>, simulate: bool) -> Self {
        Self {
            gateway,
            simulate: Arc::new(AtomicBool::new(simulate)),
        }
    }

    pub fn dry_run() -> Self {
        Self::new(None, true)
    }

    pub fn is_dry_run(&self) -> bool {
        self.gateway.is_none() || self.simulate.load(Ordering::Relaxed)
    }

    /// Shared view of the simulation flag, for status reporting.
    pub fn simulation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.simulate)
    }

    /// Switch to simulation for the rest of the process lifetime.
    pub fn force_dry_run(&self) {
        if !self.simulate.swap(true, Ordering::Relaxed) {
            tracing::warn!("Order executor forced into dry-run mode");
        }
    }

    /// Buy `usd` worth of `token_id` at `price`.
    pub async fn buy(
        &self,
        token_id: &str,
        usd: Decimal,
        price: Decimal,
    ) -> Result<OrderResult, ExecutionError> {
        let shares = shares_for(usd, price);
        self.place(Side::Buy, token_id, shares, price).await
    }

    /// Sell `shares` of `token_id` at `price`.
    pub async fn sell(
        &self,
        token_id: &str,
        shares: Decimal,
        price: Decimal,
    ) -> Result<OrderResult, ExecutionError> {
        self.place(Side::Sell, token_id, shares, price).await
    }

    async fn place(
        &self,
        side: Side,
        token_id: &str,
        shares: Decimal,
        price: Decimal,
    ) -> Result<OrderResult, ExecutionError> {
        if shares <= Decimal::ZERO {
            return Err(ExecutionError::ZeroShares(price));
        }

        let gateway = match &self.gateway {
            Some(g) if !self.simulate.load(Ordering::Relaxed) => g,
            _ => {
                tracing::info!(
                    token_id,
                    side = %side,
                    shares = %shares,
                    price = %price,
                    "[DRY-RUN] Would place limit order"
                );
                return Ok(OrderResult {
                    order_id: format!("dry-run-{}", Uuid::new_v4()),
                    shares,
                    price,
                    simulated: true,
                });
            }
        };

        tracing::info!(
            token_id,
            side = %side,
            shares = %shares,
            price = %price,
            "Placing limit order on CLOB"
        );

        let order_id = gateway.submit(side, token_id, shares, price).await?;

        Ok(OrderResult {
            order_id,
            shares,
            price,
            simulated: false,
        })
    }
}
