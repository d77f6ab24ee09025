use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// What a position diff says a wallet just did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    NewEntry,
    Increase,
    ExitPartial,
    ExitFull,
}

impl SignalKind {
    pub fn is_exit(&self) -> bool {
        matches!(self, SignalKind::ExitPartial | SignalKind::ExitFull)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::NewEntry => "NEW_ENTRY",
            SignalKind::Increase => "INCREASE",
            SignalKind::ExitPartial => "EXIT_PARTIAL",
            SignalKind::ExitFull => "EXIT_FULL",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single wallet's position change. Transient, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct WalletSignal {
    pub kind: SignalKind,
    pub wallet: String,
    pub wallet_score: Decimal,
    pub market_id: String,
    pub outcome: String,
    /// Token id of the outcome, used as the order instrument.
    pub asset_id: String,
    pub title: Option<String>,
    /// Shares held after the change (zero on a full exit).
    pub size: Decimal,
    /// Absolute change in shares.
    pub size_delta: Decimal,
    /// Absolute change in USD at the current price.
    pub value_delta: Decimal,
    /// The whale's average entry price.
    pub whale_price: Decimal,
    pub current_price: Decimal,
    pub market_end: Option<DateTime<Utc>>,
    pub detected_at: DateTime<Utc>,
}

/// Entry signals for one (market, outcome) that agreed across enough
/// independent wallets.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusSignal {
    pub market_id: String,
    pub outcome: String,
    /// Highest-scored surviving wallet's signal; sizing and prices come from it.
    pub representative: WalletSignal,
    /// Wallets counted as independent.
    pub wallets: Vec<String>,
    /// Wallets dropped as clustered with a higher-scored member.
    pub dropped: Vec<String>,
    pub independent_count: usize,
}

/// Output of the monitor's reduction step, input to the executor.
#[derive(Debug, Clone, Serialize)]
pub enum Signal {
    Consensus(ConsensusSignal),
    Exit(WalletSignal),
}

impl Signal {
    pub fn is_exit(&self) -> bool {
        matches!(self, Signal::Exit(_))
    }
}
