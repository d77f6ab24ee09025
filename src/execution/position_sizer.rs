use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

/// Caps applied when sizing a copy trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingLimits {
    pub bankroll: Decimal,
    /// Fraction of the whale's USD move to copy (default 5%).
    pub copy_fraction: Decimal,
    /// Hard cap per trade in USD (default 50).
    pub max_per_trade: Decimal,
    /// Max single trade as fraction of bankroll (default 5%).
    pub max_bankroll_fraction: Decimal,
    /// Max USD committed per UTC day (default 200).
    pub daily_cap: Decimal,
    /// Smallest order worth placing (default 5).
    pub min_ticket: Decimal,
}

impl Default for SizingLimits {
    fn default() -> Self {
        Self {
            bankroll: Decimal::from(1_000),
            copy_fraction: Decimal::new(5, 2),         // 0.05
            max_per_trade: Decimal::from(50),
            max_bankroll_fraction: Decimal::new(5, 2), // 0.05
            daily_cap: Decimal::from(200),
            min_ticket: Decimal::from(5),
        }
    }
}

impl SizingLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            bankroll: config.bankroll,
            copy_fraction: config.copy_fraction,
            max_per_trade: config.max_per_trade,
            max_bankroll_fraction: config.max_bankroll_fraction,
            daily_cap: config.daily_cap,
            min_ticket: config.min_ticket,
        }
    }

    /// Budget left today given what is already committed.
    pub fn remaining_budget(&self, exposure: Decimal) -> Decimal {
        (self.daily_cap - exposure).max(Decimal::ZERO)
    }
}

/// USD size of a copy trade:
/// min(whale delta × copy fraction, per-trade cap, bankroll cap, remaining budget).
pub fn copy_size(whale_value_delta: Decimal, limits: &SizingLimits, remaining: Decimal) -> Decimal {
    let proportional = whale_value_delta.abs() * limits.copy_fraction;
    let bankroll_cap = limits.bankroll * limits.max_bankroll_fraction;

    proportional
        .min(limits.max_per_trade)
        .min(bankroll_cap)
        .min(remaining)
        .max(Decimal::ZERO)
}

/// Shares bought with `usd` at `price`, floored to 2 dp.
pub fn shares_for(usd: Decimal, price: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (usd / price).trunc_with_scale(2)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
