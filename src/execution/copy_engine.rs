use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::{counter, gauge};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::db::copy_trade_repo::{self, NewCopyTrade};
use crate::db::{wallet_repo, AuditEvent, AuditLog, AuditRecord};
use crate::models::{short_addr, ConsensusSignal, CopyTrade, Signal, Side, WalletSignal};
use crate::polymarket::GammaClient;

use super::order_executor::OrderExecutor;
use super::position_sizer::shares_for;
use super::risk_manager::{self, CopyLimits, EntryContext, SkipReason};

/// USD committed today, kept in memory so a store outage mid-tick never
/// lets the executor overshoot the daily cap.
#[derive(Debug, Clone, Default)]
pub struct ExposureLedger {
    day: Option<NaiveDate>,
    committed: Decimal,
}

impl ExposureLedger {
    /// Exposure for the day of `now`; a new UTC day starts at zero.
    pub fn current(&self, now: DateTime<Utc>) -> Decimal {
        if self.day == Some(now.date_naive()) {
            self.committed
        } else {
            Decimal::ZERO
        }
    }

    /// Replace the figure with the store's value.
    pub fn sync(&mut self, stored: Decimal, now: DateTime<Utc>) {
        self.day = Some(now.date_naive());
        self.committed = stored;
    }

    pub fn add(&mut self, size: Decimal, now: DateTime<Utc>) {
        let current = self.current(now);
        self.sync(current + size, now);
    }

    /// Give back a committed amount (failed order, or a copy from today closed).
    pub fn release(&mut self, size: Decimal, now: DateTime<Utc>) {
        let current = self.current(now);
        self.sync((current - size).max(Decimal::ZERO), now);
    }
}

/// What happened to one signal.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Placed(CopyTrade),
    Skipped(SkipReason),
    Failed(String),
    Closed(Vec<CopyTrade>),
    /// A store call failed; nothing was written for this signal.
    Abandoned(String),
}

/// Counts per outcome for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub placed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub closed: usize,
    pub abandoned: usize,
    /// Source wallets newly blacklisted by the copy-history gate.
    pub blacklisted: Vec<String>,
}

impl BatchSummary {
    fn record(&mut self, outcome: &ExecutionOutcome) {
        match outcome {
            ExecutionOutcome::Placed(_) => self.placed += 1,
            ExecutionOutcome::Skipped(_) => self.skipped += 1,
            ExecutionOutcome::Failed(_) => self.failed += 1,
            ExecutionOutcome::Closed(trades) => self.closed += trades.len(),
            ExecutionOutcome::Abandoned(_) => self.abandoned += 1,
        }
    }
}

/// Exits first, so entries see the post-exit exposure.
pub fn order_for_execution(mut signals: Vec<Signal>) -> Vec<Signal> {
    signals.sort_by_key(|s| !s.is_exit());
    signals
}

/// Sizes, gates and places copy trades; closes them when the source exits.
pub struct CopyExecutor {
    pool: PgPool,
    orders: OrderExecutor,
    gamma: GammaClient,
    limits: CopyLimits,
    audit: AuditLog,
    ledger: Mutex<ExposureLedger>,
    market_ends: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CopyExecutor {
    pub fn new(
        pool: PgPool,
        orders: OrderExecutor,
        gamma: GammaClient,
        limits: CopyLimits,
        audit: AuditLog,
    ) -> Self {
        Self {
            pool,
            orders,
            gamma,
            limits,
            audit,
            ledger: Mutex::new(ExposureLedger::default()),
            market_ends: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.orders.is_dry_run()
    }

    pub fn simulation_flag(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        self.orders.simulation_flag()
    }

    /// Force simulation for the rest of the process lifetime.
    pub fn force_dry_run(&self) {
        self.orders.force_dry_run();
    }

    /// Today's exposure as last known by the executor.
    pub async fn exposure(&self) -> Decimal {
        self.ledger.lock().await.current(Utc::now())
    }

    /// Run one tick's signals. Never fails: every signal ends in an outcome.
    pub async fn process_batch(&self, signals: Vec<Signal>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        if signals.is_empty() {
            return summary;
        }

        self.refresh_exposure().await;

        for signal in order_for_execution(signals) {
            let outcome = match &signal {
                Signal::Exit(exit) => self.handle_exit(exit).await,
                Signal::Consensus(consensus) => self.handle_entry(consensus).await,
            };
            if let (Signal::Consensus(consensus), ExecutionOutcome::Skipped(reason)) = (&signal, &outcome) {
                let wallet = &consensus.representative.wallet;
                if reason.blacklists_wallet() && self.blacklist(wallet, &reason.to_string()).await {
                    summary.blacklisted.push(wallet.clone());
                }
            }
            summary.record(&outcome);
        }

        let exposure = self.exposure().await;
        gauge!("daily_exposure").set(exposure.to_f64().unwrap_or(0.0));

        tracing::info!(
            placed = summary.placed,
            skipped = summary.skipped,
            failed = summary.failed,
            closed = summary.closed,
            abandoned = summary.abandoned,
            blacklisted = summary.blacklisted.len(),
            exposure = %exposure,
            "Signal batch executed"
        );

        summary
    }

    async fn refresh_exposure(&self) {
        let now = Utc::now();
        match copy_trade_repo::today_exposure(&self.pool, now).await {
            Ok(stored) => self.ledger.lock().await.sync(stored, now),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read today's exposure, keeping last known figure");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Entries
    // -----------------------------------------------------------------------

    async fn handle_entry(&self, consensus: &ConsensusSignal) -> ExecutionOutcome {
        let signal = &consensus.representative;
        let now = Utc::now();

        let ctx = match self.entry_context(signal, now).await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    wallet = %signal.wallet,
                    market = %signal.market_id,
                    "Failed to load entry context, signal abandoned"
                );
                return self.abandon(signal, &e.to_string()).await;
            }
        };

        let decision = match risk_manager::evaluate_entry(&ctx, &self.limits, now) {
            Ok(d) => d,
            Err(reason) => return self.skip(signal, reason).await,
        };

        let new = NewCopyTrade {
            wallet_address: signal.wallet.clone(),
            market_id: signal.market_id.clone(),
            outcome: signal.outcome.clone(),
            asset_id: signal.asset_id.clone(),
            side: Side::Buy.as_str().to_string(),
            size: decision.size,
            shares: shares_for(decision.size, signal.current_price),
            entry_price: signal.current_price,
            whale_price: signal.whale_price,
            entry_slippage: decision.slippage,
            independent_count: consensus.independent_count as i32,
            dry_run: self.orders.is_dry_run(),
        };

        let pending = match copy_trade_repo::insert_pending(&self.pool, &new).await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    wallet = %signal.wallet,
                    market = %signal.market_id,
                    "Failed to record pending copy trade, signal abandoned"
                );
                return self.abandon(signal, &e.to_string()).await;
            }
        };
        self.ledger.lock().await.add(pending.size, now);

        match self
            .orders
            .buy(&pending.asset_id, pending.size, pending.entry_price)
            .await
        {
            Ok(result) => {
                if let Err(e) = copy_trade_repo::mark_filled(&self.pool, pending.id, &result.order_id).await {
                    tracing::error!(error = %e, copy_trade_id = %pending.id, "Failed to mark copy trade filled");
                }
                counter!("copy_trades_placed").increment(1);
                tracing::info!(
                    copy_trade_id = %pending.id,
                    wallet = %short_addr(&signal.wallet),
                    market = %signal.market_id,
                    outcome = %signal.outcome,
                    size = %pending.size,
                    price = %pending.entry_price,
                    independent = consensus.independent_count,
                    dry_run = result.simulated,
                    "Copy trade placed"
                );
                self.audit
                    .append(
                        &AuditRecord::new(
                            AuditEvent::Placed,
                            &signal.wallet,
                            &signal.market_id,
                            &signal.outcome,
                            result.simulated,
                        )
                        .with_trade(pending.id, pending.size, pending.entry_price),
                    )
                    .await;
                ExecutionOutcome::Placed(pending)
            }
            Err(e) => {
                let msg = e.to_string();
                if let Err(db_err) = copy_trade_repo::mark_failed(&self.pool, pending.id, &msg).await {
                    tracing::error!(error = %db_err, copy_trade_id = %pending.id, "Failed to mark copy trade failed");
                }
                self.ledger.lock().await.release(pending.size, now);
                counter!("copy_trades_failed").increment(1);
                tracing::error!(
                    copy_trade_id = %pending.id,
                    wallet = %signal.wallet,
                    market = %signal.market_id,
                    error = %msg,
                    "Copy order failed"
                );
                self.audit
                    .append(
                        &AuditRecord::new(
                            AuditEvent::Failed,
                            &signal.wallet,
                            &signal.market_id,
                            &signal.outcome,
                            pending.dry_run,
                        )
                        .with_trade(pending.id, pending.size, pending.entry_price)
                        .with_reason(msg.clone()),
                    )
                    .await;
                ExecutionOutcome::Failed(msg)
            }
        }
    }

    async fn entry_context(&self, signal: &WalletSignal, now: DateTime<Utc>) -> anyhow::Result<EntryContext> {
        let open = copy_trade_repo::get_open_for_wallet_market(&self.pool, &signal.wallet, &signal.market_id).await?;
        let copy_record = copy_trade_repo::copy_record(&self.pool, &signal.wallet).await?;
        let market_end = self.market_end(&signal.market_id, signal.market_end).await;
        let exposure = self.ledger.lock().await.current(now);

        Ok(EntryContext {
            current_price: signal.current_price,
            whale_price: signal.whale_price,
            whale_value_delta: signal.value_delta,
            market_end,
            exposure,
            has_open_copy: open.is_some(),
            copy_record,
        })
    }

    /// Market end time: cached, then the metadata API, then the positions feed.
    async fn market_end(&self, market_id: &str, feed_end: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        if let Some(end) = self.market_ends.lock().await.get(market_id) {
            return Some(*end);
        }

        match self.gamma.get_market_end(market_id).await {
            Ok(Some(end)) => {
                self.market_ends.lock().await.insert(market_id.to_string(), end);
                Some(end)
            }
            Ok(None) => feed_end,
            Err(e) => {
                tracing::debug!(market = %market_id, error = %e, "Market metadata unavailable, using feed end date");
                feed_end
            }
        }
    }

    async fn skip(&self, signal: &WalletSignal, reason: SkipReason) -> ExecutionOutcome {
        counter!("copy_trades_skipped", "reason" => reason.code()).increment(1);
        tracing::info!(
            wallet = %short_addr(&signal.wallet),
            market = %signal.market_id,
            outcome = %signal.outcome,
            reason = %reason,
            "Copy signal skipped"
        );

        self.audit
            .append(
                &AuditRecord::new(
                    AuditEvent::Skipped,
                    &signal.wallet,
                    &signal.market_id,
                    &signal.outcome,
                    self.orders.is_dry_run(),
                )
                .with_reason(reason.to_string()),
            )
            .await;

        ExecutionOutcome::Skipped(reason)
    }

    async fn abandon(&self, signal: &WalletSignal, error: &str) -> ExecutionOutcome {
        self.audit
            .append(
                &AuditRecord::new(
                    AuditEvent::Failed,
                    &signal.wallet,
                    &signal.market_id,
                    &signal.outcome,
                    self.orders.is_dry_run(),
                )
                .with_reason(format!("store unavailable: {error}")),
            )
            .await;
        ExecutionOutcome::Abandoned(error.to_string())
    }

    // -----------------------------------------------------------------------
    // Exits
    // -----------------------------------------------------------------------

    async fn handle_exit(&self, signal: &WalletSignal) -> ExecutionOutcome {
        let open = match copy_trade_repo::get_open_for_outcome(&self.pool, &signal.market_id, &signal.outcome).await {
            Ok(trades) => trades,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    market = %signal.market_id,
                    "Failed to load open copy trades, exit abandoned"
                );
                return self.abandon(signal, &e.to_string()).await;
            }
        };

        if open.is_empty() {
            tracing::debug!(
                wallet = %short_addr(&signal.wallet),
                market = %signal.market_id,
                kind = %signal.kind,
                "Exit with no open copies"
            );
            return ExecutionOutcome::Closed(Vec::new());
        }

        let now = Utc::now();
        let exit_price = signal.current_price;
        let mut closed = Vec::with_capacity(open.len());

        for trade in open {
            let pnl = trade.pnl_at(exit_price);
            let updated = match copy_trade_repo::close_trade(&self.pool, trade.id, exit_price, pnl, now).await {
                Ok(Some(t)) => t,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, copy_trade_id = %trade.id, "Failed to close copy trade");
                    continue;
                }
            };

            if updated.created_at.date_naive() == now.date_naive() {
                self.ledger.lock().await.release(updated.size, now);
            }
            counter!("copy_trades_closed").increment(1);
            tracing::info!(
                copy_trade_id = %updated.id,
                source = %short_addr(&signal.wallet),
                market = %updated.market_id,
                exit_price = %exit_price,
                pnl = %pnl,
                status = %updated.status,
                "Copy trade closed"
            );

            let mut record = AuditRecord::new(
                AuditEvent::Closed,
                &updated.wallet_address,
                &updated.market_id,
                &updated.outcome,
                updated.dry_run,
            )
            .with_trade(updated.id, updated.size, exit_price)
            .with_pnl(pnl);

            if !updated.dry_run && !self.orders.is_dry_run() {
                if let Err(e) = self.orders.sell(&updated.asset_id, updated.shares, exit_price).await {
                    tracing::error!(
                        copy_trade_id = %updated.id,
                        error = %e,
                        "Offsetting sell failed"
                    );
                    record = record.with_reason(format!("offsetting sell failed: {e}"));
                }
            }

            self.audit.append(&record).await;
            closed.push(updated);
        }

        ExecutionOutcome::Closed(closed)
    }

    // -----------------------------------------------------------------------
    // Blacklisting
    // -----------------------------------------------------------------------

    /// Returns true only when this call blacklisted the wallet.
    async fn blacklist(&self, wallet: &str, reason: &str) -> bool {
        match wallet_repo::blacklist_wallet(&self.pool, wallet, reason).await {
            Ok(true) => {
                counter!("wallets_blacklisted").increment(1);
                tracing::warn!(wallet = %wallet, reason = %reason, "Wallet blacklisted");
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::error!(wallet = %wallet, error = %e, "Failed to blacklist wallet");
                false
            }
        }
    }

    /// Re-check every wallet with enough resolved copies against the win-rate
    /// gate. Returns the wallets newly blacklisted.
    pub async fn recheck_copy_history(&self) -> Vec<String> {
        let candidates = match copy_trade_repo::wallets_with_resolved_copies(
            &self.pool,
            self.limits.blacklist_min_copies,
        )
        .await
        {
            Ok(w) => w,
            Err(e) => {
                tracing::warn!(error = %e, "Blacklist re-check skipped");
                return Vec::new();
            }
        };

        let mut blacklisted = Vec::new();
        for wallet in candidates {
            let record = match copy_trade_repo::copy_record(&self.pool, &wallet).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(wallet = %wallet, error = %e, "Failed to load copy record");
                    continue;
                }
            };
            if let Err(reason) = risk_manager::check_copy_history(&record, &self.limits) {
                if self.blacklist(&wallet, &reason.to_string()).await {
                    blacklisted.push(wallet);
                }
            }
        }
        blacklisted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalKind;
    use chrono::Duration;

    fn wallet_signal(kind: SignalKind) -> WalletSignal {
        WalletSignal {
            kind,
            wallet: "0xA".into(),
            wallet_score: Decimal::from(70),
            market_id: "M".into(),
            outcome: "Yes".into(),
            asset_id: "1".into(),
            title: None,
            size: Decimal::ZERO,
            size_delta: Decimal::from(1_000),
            value_delta: Decimal::from(500),
            whale_price: Decimal::new(50, 2),
            current_price: Decimal::new(50, 2),
            market_end: None,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_exits_ordered_before_entries() {
        let entry = Signal::Consensus(ConsensusSignal {
            market_id: "M".into(),
            outcome: "Yes".into(),
            representative: wallet_signal(SignalKind::NewEntry),
            wallets: vec!["0xA".into()],
            dropped: vec![],
            independent_count: 1,
        });
        let exit = Signal::Exit(wallet_signal(SignalKind::ExitFull));

        let ordered = order_for_execution(vec![entry.clone(), exit.clone(), entry]);
        assert!(ordered[0].is_exit());
        assert!(!ordered[1].is_exit());
        assert!(!ordered[2].is_exit());
    }

    #[test]
    fn test_ledger_tracks_commitments_within_a_day() {
        let now = Utc::now();
        let mut ledger = ExposureLedger::default();
        assert_eq!(ledger.current(now), Decimal::ZERO);

        ledger.sync(Decimal::from(100), now);
        ledger.add(Decimal::from(25), now);
        assert_eq!(ledger.current(now), Decimal::from(125));

        ledger.release(Decimal::from(200), now);
        assert_eq!(ledger.current(now), Decimal::ZERO);
    }

    #[test]
    fn test_ledger_resets_on_new_day() {
        let now = Utc::now();
        let mut ledger = ExposureLedger::default();
        ledger.sync(Decimal::from(150), now);
        assert_eq!(ledger.current(now + Duration::days(1)), Decimal::ZERO);

        ledger.add(Decimal::from(10), now + Duration::days(1));
        assert_eq!(ledger.current(now + Duration::days(1)), Decimal::from(10));
    }

    #[test]
    fn test_batch_summary_counts_closed_trades() {
        let mut summary = BatchSummary::default();
        summary.record(&ExecutionOutcome::Skipped(SkipReason::MarketEndUnknown));
        summary.record(&ExecutionOutcome::Closed(Vec::new()));
        summary.record(&ExecutionOutcome::Failed("boom".into()));
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.closed, 0);
        assert_eq!(summary.failed, 1);
    }
}
