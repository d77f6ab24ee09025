use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};

use crate::models::{PnlProvenance, RawTrade};

/// Below both of these a wallet has no score at all.
pub const MIN_SCORING_TRADES: usize = 5;
pub const MIN_SCORING_VOLUME: i64 = 1_000;

const EV_WEIGHT: i64 = 30;
const ROI_WEIGHT: i64 = 25;
const PROFIT_FACTOR_WEIGHT: i64 = 15;
const CONSISTENCY_WEIGHT: i64 = 15;
const SAMPLE_WEIGHT: i64 = 10;
const RECENCY_WEIGHT: i64 = 5;

/// USD of expected profit per trade that earns full EV credit.
const EV_FULL_CREDIT: i64 = 100;
/// Sample size that earns full confidence credit.
const SAMPLE_FULL_CREDIT: i64 = 200;
/// Recency credit halves roughly every 2.8 weeks (e-folding of 4 weeks).
const RECENCY_DECAY_WEEKS: i64 = 4;

/// Composite profitability score and its six weighted components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletScore {
    pub composite: Decimal,
    pub ev_score: Decimal,
    pub roi_score: Decimal,
    pub profit_factor_score: Decimal,
    pub consistency_score: Decimal,
    pub sample_score: Decimal,
    pub recency_score: Decimal,
    pub trade_count: i32,
    pub ev_per_trade: Decimal,
    pub roi: Decimal,
    pub profit_factor: Decimal,
    pub provenance: PnlProvenance,
    pub insufficient_data: bool,
    pub last_trade_at: Option<DateTime<Utc>>,
}

impl WalletScore {
    fn insufficient(trade_count: usize, last_trade_at: Option<DateTime<Utc>>) -> Self {
        Self {
            composite: Decimal::ZERO,
            ev_score: Decimal::ZERO,
            roi_score: Decimal::ZERO,
            profit_factor_score: Decimal::ZERO,
            consistency_score: Decimal::ZERO,
            sample_score: Decimal::ZERO,
            recency_score: Decimal::ZERO,
            trade_count: trade_count as i32,
            ev_per_trade: Decimal::ZERO,
            roi: Decimal::ZERO,
            profit_factor: Decimal::ZERO,
            provenance: PnlProvenance::Estimated,
            insufficient_data: true,
            last_trade_at,
        }
    }
}

/// Score a wallet from its trade sample plus leaderboard aggregates.
///
/// The trade feed carries no per-trade P&L, so EV and ROI come from the
/// leaderboard figures and the profit factor is measured from matched
/// buy/sell fills when the sample has any.
pub fn score_wallet(
    trades: &[RawTrade],
    leaderboard_pnl: Decimal,
    leaderboard_volume: Decimal,
    now: DateTime<Utc>,
) -> WalletScore {
    let n = trades.len();
    let last_trade_at = trades.iter().map(|t| t.traded_at).max();

    if n < MIN_SCORING_TRADES && leaderboard_volume < Decimal::from(MIN_SCORING_VOLUME) {
        return WalletScore::insufficient(n, last_trade_at);
    }

    let sample_volume: Decimal = trades.iter().map(|t| t.usd_value).sum();
    let volume = if leaderboard_volume > Decimal::ZERO {
        leaderboard_volume
    } else {
        sample_volume
    };

    let ev = ev_per_trade(leaderboard_pnl, n);
    let roi = if volume.is_zero() {
        Decimal::ZERO
    } else {
        leaderboard_pnl / volume
    };
    let (pf, provenance) = match matched_profit_factor(trades) {
        Some(pf) => (pf, PnlProvenance::Measured),
        None => ((Decimal::ONE + roi).max(Decimal::ZERO), PnlProvenance::Estimated),
    };

    let ev_score = ev_component(ev);
    let roi_score = roi_component(roi);
    let profit_factor_score = profit_factor_component(pf);
    let consistency_score = consistency_component(trades);
    let sample_score = sample_component(n);
    let recency_score = recency_component(last_trade_at, now);

    let composite = (ev_score
        + roi_score
        + profit_factor_score
        + consistency_score
        + sample_score
        + recency_score)
        .max(Decimal::ZERO)
        .min(Decimal::ONE_HUNDRED)
        .round_dp(2);

    WalletScore {
        composite,
        ev_score,
        roi_score,
        profit_factor_score,
        consistency_score,
        sample_score,
        recency_score,
        trade_count: n as i32,
        ev_per_trade: ev.round_dp(4),
        roi: roi.round_dp(6),
        profit_factor: pf.round_dp(4),
        provenance,
        insufficient_data: false,
        last_trade_at,
    }
}

fn clamp_to(value: Decimal, weight: i64) -> Decimal {
    value
        .max(Decimal::ZERO)
        .min(Decimal::from(weight))
        .round_dp(4)
}

// ---------------------------------------------------------------------------
// Component 1: EV per trade (capped)
// ---------------------------------------------------------------------------

fn ev_per_trade(total_pnl: Decimal, trade_count: usize) -> Decimal {
    if trade_count == 0 {
        return Decimal::ZERO;
    }
    total_pnl / Decimal::from(trade_count as i64)
}

fn ev_component(ev: Decimal) -> Decimal {
    let capped = ev.min(Decimal::from(EV_FULL_CREDIT));
    clamp_to(
        capped / Decimal::from(EV_FULL_CREDIT) * Decimal::from(EV_WEIGHT),
        EV_WEIGHT,
    )
}

// ---------------------------------------------------------------------------
// Component 2: ROI as a risk proxy
// ---------------------------------------------------------------------------

/// 25% return on volume earns full credit.
fn roi_component(roi: Decimal) -> Decimal {
    let full = Decimal::new(25, 2);
    clamp_to(roi / full * Decimal::from(ROI_WEIGHT), ROI_WEIGHT)
}

// ---------------------------------------------------------------------------
// Component 3: Profit factor
// ---------------------------------------------------------------------------

/// Gross gain / gross loss realized by selling against the running average
/// buy price of each (market, outcome). `None` when nothing was sold back.
pub fn matched_profit_factor(trades: &[RawTrade]) -> Option<Decimal> {
    let mut ordered: Vec<&RawTrade> = trades.iter().collect();
    ordered.sort_by_key(|t| t.traded_at);

    // (market, outcome) -> (shares held, cost basis)
    let mut book: HashMap<(&str, &str), (Decimal, Decimal)> = HashMap::new();
    let mut gross_gain = Decimal::ZERO;
    let mut gross_loss = Decimal::ZERO;
    let mut matched = false;

    for t in ordered {
        let entry = book
            .entry((t.market_id.as_str(), t.outcome.as_str()))
            .or_insert((Decimal::ZERO, Decimal::ZERO));

        if t.is_buy() {
            entry.0 += t.size;
            entry.1 += t.size * t.price;
            continue;
        }

        let (held, cost) = *entry;
        if held <= Decimal::ZERO {
            continue;
        }
        let qty = t.size.min(held);
        let avg = cost / held;
        let realized = (t.price - avg) * qty;
        if realized >= Decimal::ZERO {
            gross_gain += realized;
        } else {
            gross_loss += -realized;
        }
        entry.0 = held - qty;
        entry.1 = cost - avg * qty;
        matched = true;
    }

    if !matched {
        return None;
    }
    if gross_loss.is_zero() {
        // All realized sells were profitable (or flat)
        return Some(if gross_gain.is_zero() {
            Decimal::ONE
        } else {
            Decimal::from(3)
        });
    }
    Some(gross_gain / gross_loss)
}

/// A profit factor of 1 earns nothing, 3 or more earns full credit.
fn profit_factor_component(pf: Decimal) -> Decimal {
    let scaled = (pf - Decimal::ONE) / Decimal::TWO * Decimal::from(PROFIT_FACTOR_WEIGHT);
    clamp_to(scaled, PROFIT_FACTOR_WEIGHT)
}

// ---------------------------------------------------------------------------
// Component 4: Volume-weighted consistency
// ---------------------------------------------------------------------------

/// Share of volume that came from trades no larger than 3× the median trade.
/// One outsized bet carrying the record pulls this toward zero.
fn consistency_component(trades: &[RawTrade]) -> Decimal {
    if trades.len() < 2 {
        return Decimal::ZERO;
    }

    let mut values: Vec<Decimal> = trades.iter().map(|t| t.usd_value.abs()).collect();
    values.sort();
    let total: Decimal = values.iter().copied().sum();
    if total.is_zero() {
        return Decimal::ZERO;
    }

    let mid = values.len() / 2;
    let median = if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / Decimal::TWO
    } else {
        values[mid]
    };
    let ceiling = median * Decimal::from(3);

    let typical: Decimal = values.iter().map(|v| (*v).min(ceiling)).sum();
    clamp_to(
        typical / total * Decimal::from(CONSISTENCY_WEIGHT),
        CONSISTENCY_WEIGHT,
    )
}

// ---------------------------------------------------------------------------
// Component 5: Sample-size confidence (log scaled)
// ---------------------------------------------------------------------------

fn sample_component(trade_count: usize) -> Decimal {
    if trade_count == 0 {
        return Decimal::ZERO;
    }
    let n = Decimal::from(trade_count as i64 + 1).ln();
    let full = Decimal::from(SAMPLE_FULL_CREDIT + 1).ln();
    clamp_to(n / full * Decimal::from(SAMPLE_WEIGHT), SAMPLE_WEIGHT)
}

// ---------------------------------------------------------------------------
// Component 6: Recency decay
// ---------------------------------------------------------------------------

fn recency_component(last_trade_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Decimal {
    let Some(last) = last_trade_at else {
        return Decimal::ZERO;
    };
    let secs = (now - last).num_seconds().max(0);
    let weeks = Decimal::from(secs) / Decimal::from(7 * 24 * 3600);
    let decay = (-weeks / Decimal::from(RECENCY_DECAY_WEEKS))
        .checked_exp()
        .unwrap_or(Decimal::ZERO);
    clamp_to(decay * Decimal::from(RECENCY_WEIGHT), RECENCY_WEIGHT)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn trade(side: &str, market: &str, size: i64, price: Decimal, days_ago: i64) -> RawTrade {
        let now = Utc::now();
        RawTrade {
            id: Uuid::new_v4(),
            wallet_address: "0xabc".into(),
            market_id: market.into(),
            outcome: "Yes".into(),
            side: side.into(),
            size: Decimal::from(size),
            price,
            usd_value: Decimal::from(size) * price,
            traded_at: now - Duration::days(days_ago),
            created_at: now,
        }
    }

    fn buys(count: usize, usd_each: i64) -> Vec<RawTrade> {
        (0..count)
            .map(|i| trade("BUY", &format!("m{i}"), usd_each * 2, Decimal::new(5, 1), i as i64))
            .collect()
    }

    #[test]
    fn test_insufficient_data_scores_zero() {
        let trades = buys(4, 100);
        let score = score_wallet(&trades, Decimal::from(50_000), Decimal::from(999), Utc::now());
        assert!(score.insufficient_data);
        assert_eq!(score.composite, Decimal::ZERO);
        assert_eq!(score.trade_count, 4);
    }

    #[test]
    fn test_few_trades_but_large_volume_is_scored() {
        let trades = buys(3, 1_000);
        let score = score_wallet(&trades, Decimal::from(20_000), Decimal::from(100_000), Utc::now());
        assert!(!score.insufficient_data);
        assert!(score.composite > Decimal::ZERO);
    }

    #[test]
    fn test_composite_is_bounded() {
        let now = Utc::now();
        let trades = buys(500, 1_000);
        let huge = score_wallet(&trades, Decimal::from(100_000_000), Decimal::from(1_000), now);
        assert!(huge.composite <= Decimal::ONE_HUNDRED);
        assert!(huge.ev_score <= Decimal::from(EV_WEIGHT));
        assert!(huge.roi_score <= Decimal::from(ROI_WEIGHT));

        let losing = score_wallet(&trades, Decimal::from(-5_000_000), Decimal::from(10_000_000), now);
        assert!(losing.composite >= Decimal::ZERO);
        assert_eq!(losing.ev_score, Decimal::ZERO);
        assert_eq!(losing.roi_score, Decimal::ZERO);
    }

    #[test]
    fn test_profitable_wallet_outscores_flat_wallet() {
        let now = Utc::now();
        let trades = buys(50, 200);
        let good = score_wallet(&trades, Decimal::from(25_000), Decimal::from(100_000), now);
        let flat = score_wallet(&trades, Decimal::ZERO, Decimal::from(100_000), now);
        assert!(good.composite > flat.composite);
    }

    #[test]
    fn test_recency_decays_with_age() {
        let now = Utc::now();
        let fresh = recency_component(Some(now), now);
        let stale = recency_component(Some(now - Duration::weeks(8)), now);
        assert_eq!(fresh, Decimal::from(RECENCY_WEIGHT));
        assert!(stale < fresh);
        assert!(stale > Decimal::ZERO);
        assert_eq!(recency_component(None, now), Decimal::ZERO);
    }

    #[test]
    fn test_sample_confidence_is_log_scaled() {
        let ten = sample_component(10);
        let hundred = sample_component(100);
        let thousand = sample_component(1_000);
        assert!(ten < hundred);
        assert_eq!(thousand, Decimal::from(SAMPLE_WEIGHT));
        // Ten times more trades gives much less than ten times the credit
        assert!(hundred < ten * Decimal::TWO);
    }

    #[test]
    fn test_matched_profit_factor_is_measured() {
        let trades = vec![
            trade("BUY", "m1", 100, Decimal::new(40, 2), 5),
            trade("SELL", "m1", 100, Decimal::new(60, 2), 4),
            trade("BUY", "m2", 100, Decimal::new(50, 2), 3),
            trade("SELL", "m2", 100, Decimal::new(45, 2), 2),
            trade("BUY", "m3", 100, Decimal::new(30, 2), 1),
        ];
        // gain 20, loss 5 → PF 4
        assert_eq!(matched_profit_factor(&trades), Some(Decimal::from(4)));

        let score = score_wallet(&trades, Decimal::from(1_000), Decimal::from(10_000), Utc::now());
        assert_eq!(score.provenance, PnlProvenance::Measured);
        assert_eq!(score.profit_factor_score, Decimal::from(PROFIT_FACTOR_WEIGHT));
    }

    #[test]
    fn test_unmatched_profit_factor_is_estimated() {
        let trades = buys(10, 100);
        assert_eq!(matched_profit_factor(&trades), None);
        let score = score_wallet(&trades, Decimal::from(1_000), Decimal::from(10_000), Utc::now());
        assert_eq!(score.provenance, PnlProvenance::Estimated);
        // 1 + 10% ROI
        assert_eq!(score.profit_factor, Decimal::new(11, 1));
    }

    #[test]
    fn test_consistency_penalizes_one_outsized_bet() {
        let even = buys(10, 100);
        let mut lumpy = buys(9, 100);
        lumpy.push(trade("BUY", "whale", 200_000, Decimal::new(5, 1), 0));
        assert_eq!(consistency_component(&even), Decimal::from(CONSISTENCY_WEIGHT));
        assert!(consistency_component(&lumpy) < Decimal::ONE);
    }
}
