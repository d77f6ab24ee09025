use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::models::{SignalKind, WalletSignal};

/// Detects wallets that repeatedly enter and leave a position within a short
/// window, the pattern of baiting followers into a market.
#[derive(Debug, Clone)]
pub struct ManipulationTracker {
    window: Duration,
    threshold: u32,
    // (wallet, market) -> time of the most recent entry
    entries: HashMap<(String, String), DateTime<Utc>>,
    round_trips: HashMap<String, u32>,
    flagged: HashSet<String>,
}

impl ManipulationTracker {
    pub fn new(window_secs: i64, threshold: u32) -> Self {
        Self {
            window: Duration::seconds(window_secs),
            threshold: threshold.max(1),
            entries: HashMap::new(),
            round_trips: HashMap::new(),
            flagged: HashSet::new(),
        }
    }

    /// Feed one signal. Returns true when this signal pushed the wallet over
    /// the threshold for the first time.
    pub fn observe(&mut self, signal: &WalletSignal) -> bool {
        let key = (signal.wallet.clone(), signal.market_id.clone());
        match signal.kind {
            SignalKind::NewEntry => {
                self.entries.insert(key, signal.detected_at);
                false
            }
            SignalKind::ExitPartial | SignalKind::ExitFull => {
                let Some(entered_at) = self.entries.remove(&key) else {
                    return false;
                };
                if signal.detected_at - entered_at > self.window {
                    return false;
                }
                let count = self.round_trips.entry(signal.wallet.clone()).or_insert(0);
                *count += 1;
                tracing::debug!(
                    wallet = %signal.wallet,
                    market = %signal.market_id,
                    round_trips = *count,
                    "Quick entry/exit observed"
                );
                *count >= self.threshold && self.flagged.insert(signal.wallet.clone())
            }
            SignalKind::Increase => false,
        }
    }

    pub fn round_trips(&self, wallet: &str) -> u32 {
        self.round_trips.get(wallet).copied().unwrap_or(0)
    }

    pub fn is_flagged(&self, wallet: &str) -> bool {
        self.flagged.contains(wallet)
    }

    /// Forget a wallet after it has been blacklisted and dropped from tracking.
    pub fn forget(&mut self, wallet: &str) {
        self.entries.retain(|(w, _), _| w != wallet);
        self.round_trips.remove(wallet);
        self.flagged.remove(wallet);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn signal(kind: SignalKind, market: &str, at: DateTime<Utc>) -> WalletSignal {
        WalletSignal {
            kind,
            wallet: "0xBAIT".into(),
            wallet_score: Decimal::from(70),
            market_id: market.into(),
            outcome: "Yes".into(),
            asset_id: "token".into(),
            title: None,
            size: Decimal::from(2_000),
            size_delta: Decimal::from(2_000),
            value_delta: Decimal::from(1_000),
            whale_price: Decimal::new(50, 2),
            current_price: Decimal::new(50, 2),
            market_end: None,
            detected_at: at,
        }
    }

    #[test]
    fn test_three_quick_round_trips_flag_wallet() {
        let mut tracker = ManipulationTracker::new(300, 3);
        let t0 = Utc::now();
        let mut newly_flagged = Vec::new();

        for (i, market) in ["M1", "M2", "M3"].iter().enumerate() {
            let enter = t0 + Duration::minutes(10 * i as i64);
            assert!(!tracker.observe(&signal(SignalKind::NewEntry, market, enter)));
            let exit = enter + Duration::minutes(3);
            newly_flagged.push(tracker.observe(&signal(SignalKind::ExitFull, market, exit)));
        }

        assert_eq!(newly_flagged, vec![false, false, true]);
        assert!(tracker.is_flagged("0xBAIT"));
        assert_eq!(tracker.round_trips("0xBAIT"), 3);
    }

    #[test]
    fn test_slow_exit_is_not_counted() {
        let mut tracker = ManipulationTracker::new(300, 1);
        let t0 = Utc::now();
        tracker.observe(&signal(SignalKind::NewEntry, "M1", t0));
        let flagged =
            tracker.observe(&signal(SignalKind::ExitFull, "M1", t0 + Duration::minutes(6)));
        assert!(!flagged);
        assert_eq!(tracker.round_trips("0xBAIT"), 0);
    }

    #[test]
    fn test_exit_without_observed_entry_is_ignored() {
        let mut tracker = ManipulationTracker::new(300, 1);
        let flagged = tracker.observe(&signal(SignalKind::ExitPartial, "M1", Utc::now()));
        assert!(!flagged);
        assert!(!tracker.is_flagged("0xBAIT"));
    }

    #[test]
    fn test_forget_clears_state() {
        let mut tracker = ManipulationTracker::new(300, 1);
        let t0 = Utc::now();
        tracker.observe(&signal(SignalKind::NewEntry, "M1", t0));
        assert!(tracker.observe(&signal(SignalKind::ExitFull, "M1", t0 + Duration::seconds(30))));
        tracker.forget("0xBAIT");
        assert!(!tracker.is_flagged("0xBAIT"));
        assert_eq!(tracker.round_trips("0xBAIT"), 0);
    }
}
