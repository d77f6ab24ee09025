use std::str::FromStr;
use std::time::Duration;

use alloy::signers::local::PrivateKeySigner;
use polymarket_client_sdk::auth::Signer;
use polymarket_client_sdk::clob::client::{Client, Config};
use polymarket_client_sdk::clob::types::Side as SdkSide;
use polymarket_client_sdk::types::U256;
use polymarket_client_sdk::POLYGON;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::Side;

const CLOB_API_BASE: &str = "https://clob.polymarket.com";

type AuthenticatedClient =
    Client<polymarket_client_sdk::auth::state::Authenticated<polymarket_client_sdk::auth::Normal>>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid token id {0}")]
    InvalidToken(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("order submission failed: {0}")]
    Submit(String),

    #[error("order submission timed out after {0:?}")]
    Timeout(Duration),
}

/// Signs and submits CLOB orders for the execution wallet.
///
/// The private key is used once during construction and never stored as a string.
pub struct OrderGateway {
    signer: PrivateKeySigner,
    client: AuthenticatedClient,
    timeout: Duration,
}

impl OrderGateway {
    /// Authenticate against the CLOB with a hex private key (with or without `0x`).
    /// Every later submission is bounded by `timeout`.
    pub async fn connect(private_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let signer = PrivateKeySigner::from_str(private_key)?.with_chain_id(Some(POLYGON));

        let unauthenticated = Client::new(CLOB_API_BASE, Config::default())?;
        let client = tokio::time::timeout(
            timeout,
            unauthenticated.authentication_builder(&signer).authenticate(),
        )
        .await
        .map_err(|_| GatewayError::Timeout(timeout))??;

        tracing::info!(address = %client.address(), "Order gateway authenticated");

        Ok(Self {
            signer,
            client,
            timeout,
        })
    }

    /// Submit a limit order for `shares` of `token_id` at `price`.
    /// Returns the exchange order id.
    pub async fn submit(
        &self,
        side: Side,
        token_id: &str,
        shares: Decimal,
        price: Decimal,
    ) -> Result<String, GatewayError> {
        with_deadline(self.timeout, self.build_and_post(side, token_id, shares, price)).await
    }

    async fn build_and_post(
        &self,
        side: Side,
        token_id: &str,
        shares: Decimal,
        price: Decimal,
    ) -> Result<String, GatewayError> {
        let sdk_side = match side {
            Side::Buy => SdkSide::Buy,
            Side::Sell => SdkSide::Sell,
        };
        let token = parse_token_id(token_id)?;

        let signable = self
            .client
            .limit_order()
            .token_id(token)
            .side(sdk_side)
            .price(price)
            .size(shares)
            .build()
            .await
            .map_err(|e| GatewayError::Submit(e.to_string()))?;

        let signed = self
            .client
            .sign(&self.signer, signable)
            .await
            .map_err(|e| GatewayError::Submit(e.to_string()))?;

        let response = self
            .client
            .post_order(signed)
            .await
            .map_err(|e| GatewayError::Submit(e.to_string()))?;

        if !response.success {
            return Err(GatewayError::Rejected(
                response.error_msg.unwrap_or_else(|| "no reason given".into()),
            ));
        }

        tracing::info!(
            order_id = %response.order_id,
            status = ?response.status,
            side = %side,
            token_id,
            "Order submitted to CLOB"
        );

        Ok(response.order_id.to_string())
    }
}

/// Bound a gateway call; an elapsed deadline becomes `GatewayError::Timeout`.
async fn with_deadline<T, F>(timeout: Duration, fut: F) -> Result<T, GatewayError>
where
    F: std::future::Future<Output = Result<T, GatewayError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| GatewayError::Timeout(timeout))?
}

/// Token ids are decimal strings; accept hex too.
fn parse_token_id(token_id: &str) -> Result<U256, GatewayError> {
    U256::from_str_radix(token_id, 10)
        .or_else(|_| {
            let hex = token_id.strip_prefix("0x").unwrap_or(token_id);
            U256::from_str_radix(hex, 16)
        })
        .map_err(|_| GatewayError::InvalidToken(token_id.to_string()))
}
