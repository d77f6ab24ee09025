use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;
use crate::execution::position_sizer::{copy_size, SizingLimits};
use crate::models::CopyRecord;

/// Entry gate thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyLimits {
    pub sizing: SizingLimits,
    /// Highest implied probability worth buying (default 0.95).
    pub max_price: Decimal,
    /// Max |current - whale price| / whale price (default 15%).
    pub max_slippage: Decimal,
    /// Market must stay open at least this long (default 1h).
    pub min_market_duration_secs: i64,
    /// Resolved copies needed before the win-rate gate applies (default 5).
    pub blacklist_min_copies: i64,
    /// Min copy win rate once the gate applies (default 40%).
    pub blacklist_min_win_rate: Decimal,
}

impl Default for CopyLimits {
    fn default() -> Self {
        Self {
            sizing: SizingLimits::default(),
            max_price: Decimal::new(95, 2),
            max_slippage: Decimal::new(15, 2),
            min_market_duration_secs: 3_600,
            blacklist_min_copies: 5,
            blacklist_min_win_rate: Decimal::new(40, 2),
        }
    }
}

impl CopyLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            sizing: SizingLimits::from_config(config),
            max_price: config.max_price,
            max_slippage: config.max_slippage,
            min_market_duration_secs: config.min_market_duration_secs,
            blacklist_min_copies: config.blacklist_min_copies,
            blacklist_min_win_rate: config.blacklist_min_win_rate,
        }
    }
}

/// Why an entry signal was not copied. Expected outcomes, not failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("wallet already has an open copy on this market")]
    AlreadyOpen,

    #[error("market end time unknown")]
    MarketEndUnknown,

    #[error("market ends too soon: {remaining_secs}s left, min {min_secs}s")]
    MarketEndingSoon { remaining_secs: i64, min_secs: i64 },

    #[error("price {price} above max {max}")]
    PriceTooHigh { price: Decimal, max: Decimal },

    #[error("whale reference price is not positive")]
    InvalidReferencePrice,

    #[error("slippage cap exceeded")]
    SlippageExceeded { slippage: Decimal, max: Decimal },

    #[error("daily cap reached: exposure {exposure} of {cap}")]
    DailyCapReached { exposure: Decimal, cap: Decimal },

    #[error("ticket too small: {size} < {min}")]
    TicketTooSmall { size: Decimal, min: Decimal },

    #[error("poor copy history: win rate {win_rate} < {min}")]
    PoorCopyHistory { win_rate: Decimal, min: Decimal },
}

impl SkipReason {
    /// Short stable label for metrics and logs.
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::AlreadyOpen => "already_open",
            SkipReason::MarketEndUnknown => "market_end_unknown",
            SkipReason::MarketEndingSoon { .. } => "market_ending_soon",
            SkipReason::PriceTooHigh { .. } => "price_too_high",
            SkipReason::InvalidReferencePrice => "invalid_reference_price",
            SkipReason::SlippageExceeded { .. } => "slippage",
            SkipReason::DailyCapReached { .. } => "daily_cap",
            SkipReason::TicketTooSmall { .. } => "ticket_too_small",
            SkipReason::PoorCopyHistory { .. } => "poor_copy_history",
        }
    }

    /// Only a poor copy history blacklists the source wallet.
    pub fn blacklists_wallet(&self) -> bool {
        matches!(self, SkipReason::PoorCopyHistory { .. })
    }
}

/// What the gates need to know about the world for one signal.
#[derive(Debug, Clone)]
pub struct EntryContext {
    pub current_price: Decimal,
    pub whale_price: Decimal,
    pub whale_value_delta: Decimal,
    pub market_end: Option<DateTime<Utc>>,
    /// USD committed today before this signal.
    pub exposure: Decimal,
    pub has_open_copy: bool,
    pub copy_record: CopyRecord,
}

/// An accepted entry: how much to spend and at what slippage.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDecision {
    pub size: Decimal,
    pub slippage: Decimal,
}

/// Fractional distance between the current price and the whale's price.
pub fn slippage(current: Decimal, reference: Decimal) -> Option<Decimal> {
    if reference <= Decimal::ZERO {
        return None;
    }
    Some(((current - reference) / reference).abs())
}

/// Run the entry gates in order; the first failure wins.
pub fn evaluate_entry(
    ctx: &EntryContext,
    limits: &CopyLimits,
    now: DateTime<Utc>,
) -> Result<EntryDecision, SkipReason> {
    if ctx.has_open_copy {
        return Err(SkipReason::AlreadyOpen);
    }

    // 1. Remaining market duration
    let end = ctx.market_end.ok_or(SkipReason::MarketEndUnknown)?;
    let remaining_secs = (end - now).num_seconds();
    if remaining_secs < limits.min_market_duration_secs {
        return Err(SkipReason::MarketEndingSoon {
            remaining_secs,
            min_secs: limits.min_market_duration_secs,
        });
    }

    // 2. Price ceiling
    if ctx.current_price > limits.max_price {
        return Err(SkipReason::PriceTooHigh {
            price: ctx.current_price,
            max: limits.max_price,
        });
    }

    // 3. Slippage vs whale's price
    let slip = slippage(ctx.current_price, ctx.whale_price).ok_or(SkipReason::InvalidReferencePrice)?;
    if slip > limits.max_slippage {
        return Err(SkipReason::SlippageExceeded {
            slippage: slip.round_dp(4),
            max: limits.max_slippage,
        });
    }

    // 4. Daily cap: nothing placeable left today
    let remaining = limits.sizing.remaining_budget(ctx.exposure);
    if remaining < limits.sizing.min_ticket {
        return Err(SkipReason::DailyCapReached {
            exposure: ctx.exposure,
            cap: limits.sizing.daily_cap,
        });
    }

    // 5. Size and minimum ticket
    let size = copy_size(ctx.whale_value_delta, &limits.sizing, remaining);
    if size < limits.sizing.min_ticket {
        return Err(SkipReason::TicketTooSmall {
            size: size.round_dp(2),
            min: limits.sizing.min_ticket,
        });
    }

    // 6. Source wallet's copy history
    check_copy_history(&ctx.copy_record, limits)?;

    Ok(EntryDecision {
        size,
        slippage: slip,
    })
}

/// Win-rate gate on a wallet's resolved copies. No opinion below the minimum
/// number of resolved copies.
pub fn check_copy_history(record: &CopyRecord, limits: &CopyLimits) -> Result<(), SkipReason> {
    if record.resolved() < limits.blacklist_min_copies {
        return Ok(());
    }
    match record.win_rate() {
        Some(rate) if rate < limits.blacklist_min_win_rate => Err(SkipReason::PoorCopyHistory {
            win_rate: rate.round_dp(4),
            min: limits.blacklist_min_win_rate,
        }),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
