use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::trade_repo;
use crate::execution::position_sizer::{copy_size, SizingLimits};
use crate::models::{PnlProvenance, RawTrade, Wallet};

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub lookback_days: i64,
    pub min_trades: usize,
    pub min_win_rate: Decimal,
    pub sizing: SizingLimits,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            min_trades: 20,
            min_win_rate: Decimal::new(55, 2),
            sizing: SizingLimits::default(),
        }
    }
}

impl BacktestConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            lookback_days: config.backtest_lookback_days,
            min_trades: config.backtest_min_trades,
            min_win_rate: config.backtest_min_win_rate,
            sizing: SizingLimits::from_config(config),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    /// Too few simulated trades to hold an opinion.
    Insufficient,
}

/// A wallet's stored history plus the aggregate ROI used as a proxy when a
/// buy has no matching sell.
#[derive(Debug, Clone)]
pub struct WalletHistory {
    pub wallet: String,
    pub aggregate_roi: Decimal,
    /// Oldest first.
    pub trades: Vec<RawTrade>,
}

impl WalletHistory {
    pub fn from_wallet(wallet: &Wallet, trades: Vec<RawTrade>) -> Self {
        let aggregate_roi = if wallet.leaderboard_volume > Decimal::ZERO {
            wallet.leaderboard_pnl / wallet.leaderboard_volume
        } else {
            Decimal::ZERO
        };
        Self {
            wallet: wallet.address.clone(),
            aggregate_roi,
            trades,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WalletBacktest {
    pub wallet: String,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub pnl: Decimal,
    pub measured: usize,
    pub estimated: usize,
    /// Buys not replayed because the simulated day was already capped.
    pub capped: usize,
}

impl WalletBacktest {
    pub fn win_rate(&self) -> Option<Decimal> {
        win_rate(self.wins, self.trades)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub wallets: Vec<WalletBacktest>,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: Option<Decimal>,
    pub total_pnl: Decimal,
    pub measured: usize,
    pub estimated: usize,
    pub verdict: Verdict,
}

fn win_rate(wins: usize, total: usize) -> Option<Decimal> {
    if total == 0 {
        return None;
    }
    Some(Decimal::from(wins as u64) / Decimal::from(total as u64))
}

/// Return of a buy: measured from the wallet's next sell of the same
/// (market, outcome) when there is one, otherwise the aggregate ROI.
fn trade_return(buy: &RawTrade, history: &WalletHistory) -> (Decimal, PnlProvenance) {
    let exit = history.trades.iter().find(|t| {
        !t.is_buy()
            && t.market_id == buy.market_id
            && t.outcome == buy.outcome
            && t.traded_at > buy.traded_at
    });

    match exit {
        Some(sell) if buy.price > Decimal::ZERO => {
            ((sell.price - buy.price) / buy.price, PnlProvenance::Measured)
        }
        _ => (history.aggregate_roi, PnlProvenance::Estimated),
    }
}

/// Replay buys from every history, oldest first, through the live sizing
/// caps with one simulated daily cap shared across wallets.
pub fn simulate(histories: &[WalletHistory], config: &BacktestConfig) -> BacktestReport {
    let mut buys: Vec<(&RawTrade, usize)> = histories
        .iter()
        .enumerate()
        .flat_map(|(i, h)| h.trades.iter().filter(|t| t.is_buy()).map(move |t| (t, i)))
        .collect();
    buys.sort_by_key(|(t, _)| t.traded_at);

    let mut per_wallet: Vec<WalletBacktest> = histories
        .iter()
        .map(|h| WalletBacktest {
            wallet: h.wallet.clone(),
            ..WalletBacktest::default()
        })
        .collect();
    let mut day_exposure: HashMap<NaiveDate, Decimal> = HashMap::new();
    let sizing = &config.sizing;

    for (buy, idx) in buys {
        let used = day_exposure.entry(buy.traded_at.date_naive()).or_insert(Decimal::ZERO);
        let stats = &mut per_wallet[idx];

        let remaining = sizing.remaining_budget(*used);
        if remaining < sizing.min_ticket {
            stats.capped += 1;
            continue;
        }
        let size = copy_size(buy.usd_value, sizing, remaining);
        if size < sizing.min_ticket {
            continue;
        }
        *used += size;

        let (ret, provenance) = trade_return(buy, &histories[idx]);
        let pnl = size * ret;

        stats.trades += 1;
        stats.pnl += pnl;
        if pnl > Decimal::ZERO {
            stats.wins += 1;
        } else {
            stats.losses += 1;
        }
        match provenance {
            PnlProvenance::Measured => stats.measured += 1,
            PnlProvenance::Estimated => stats.estimated += 1,
        }
    }

    let total_trades: usize = per_wallet.iter().map(|w| w.trades).sum();
    let wins: usize = per_wallet.iter().map(|w| w.wins).sum();
    let losses: usize = per_wallet.iter().map(|w| w.losses).sum();
    let total_pnl: Decimal = per_wallet.iter().map(|w| w.pnl).sum();
    let measured: usize = per_wallet.iter().map(|w| w.measured).sum();
    let estimated: usize = per_wallet.iter().map(|w| w.estimated).sum();
    let rate = win_rate(wins, total_trades);

    let verdict = match rate {
        _ if total_trades < config.min_trades => Verdict::Insufficient,
        Some(r) if r >= config.min_win_rate => Verdict::Pass,
        _ => Verdict::Fail,
    };

    BacktestReport {
        wallets: per_wallet,
        total_trades,
        wins,
        losses,
        win_rate: rate.map(|r| r.round_dp(4)),
        total_pnl: total_pnl.round_dp(2),
        measured,
        estimated,
        verdict,
    }
}

/// Load each wallet's history within the lookback and simulate.
pub async fn run_backtest(
    pool: &PgPool,
    wallets: &[Wallet],
    config: &BacktestConfig,
    now: DateTime<Utc>,
) -> BacktestReport {
    let since = now - Duration::days(config.lookback_days);
    let mut histories = Vec::with_capacity(wallets.len());

    for wallet in wallets {
        match trade_repo::get_trades_since(pool, &wallet.address, since).await {
            Ok(trades) => histories.push(WalletHistory::from_wallet(wallet, trades)),
            Err(e) => {
                tracing::warn!(wallet = %wallet.address, error = %e, "Failed to load history for backtest");
            }
        }
    }

    let report = simulate(&histories, config);
    tracing::info!(
        wallets = report.wallets.len(),
        trades = report.total_trades,
        win_rate = ?report.win_rate,
        pnl = %report.total_pnl,
        measured = report.measured,
        estimated = report.estimated,
        verdict = ?report.verdict,
        "Backtest complete"
    );
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
