use std::time::Instant;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use sqlx::PgPool;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::config::AppConfig;
use crate::db::wallet_repo;
use crate::execution::{BatchSummary, CopyExecutor};
use crate::models::Wallet;
use crate::polymarket::DataClient;
use crate::services::backtester::{self, BacktestConfig, BacktestReport, Verdict};
use crate::services::position_monitor::{PositionMonitor, TrackedWallet};
use crate::services::whale_seeder;

const MANIPULATION_REASON: &str = "manipulation: repeated quick entry/exit";

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub tracked: usize,
    pub signals: usize,
    pub summary: BatchSummary,
    pub blacklisted: Vec<String>,
    pub reselected: bool,
}

/// Owns the lifecycle: discovery, backtest, then the polling tick.
pub struct Orchestrator {
    pool: PgPool,
    config: AppConfig,
    data: DataClient,
    monitor: PositionMonitor,
    executor: CopyExecutor,
    tracked: Vec<TrackedWallet>,
    last_discovery: Option<Instant>,
    ticks: u64,
}

impl Orchestrator {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        data: DataClient,
        monitor: PositionMonitor,
        executor: CopyExecutor,
    ) -> Self {
        Self {
            pool,
            config,
            data,
            monitor,
            executor,
            tracked: Vec::new(),
            last_discovery: None,
            ticks: 0,
        }
    }

    pub fn tracked(&self) -> &[TrackedWallet] {
        &self.tracked
    }

    /// Discover and select wallets, then gate the run mode on a backtest.
    pub async fn initialize(&mut self) -> BacktestReport {
        self.discover().await;

        let wallets = match wallet_repo::get_tracked_wallets(&self.pool).await {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load tracked wallets for backtest");
                Vec::new()
            }
        };

        let report = backtester::run_backtest(
            &self.pool,
            &wallets,
            &BacktestConfig::from_config(&self.config),
            Utc::now(),
        )
        .await;

        match report.verdict {
            Verdict::Fail => {
                tracing::warn!(
                    win_rate = ?report.win_rate,
                    min = %self.config.backtest_min_win_rate,
                    "Backtest failed, running in simulation mode"
                );
                self.executor.force_dry_run();
            }
            Verdict::Insufficient => {
                tracing::info!(trades = report.total_trades, "Backtest has too few trades to judge");
            }
            Verdict::Pass => {
                tracing::info!(win_rate = ?report.win_rate, "Backtest passed");
            }
        }

        tracing::info!(
            tracked = self.tracked.len(),
            dry_run = self.executor.is_dry_run(),
            "Orchestrator initialized"
        );
        report
    }

    /// Seed, score and select. Falls back to the stored tracked set when
    /// discovery fails outright.
    async fn discover(&mut self) {
        self.last_discovery = Some(Instant::now());
        match whale_seeder::run_discovery(&self.data, &self.pool, &self.config).await {
            Ok(wallets) => self.set_tracked(&wallets).await,
            Err(e) => {
                tracing::error!(error = %e, "Discovery failed, keeping stored tracked set");
                self.reload_tracked().await;
            }
        }
    }

    async fn reselect(&mut self) {
        match whale_seeder::select_tracked(&self.pool, &self.config).await {
            Ok(wallets) => self.set_tracked(&wallets).await,
            Err(e) => tracing::error!(error = %e, "Reselection failed, keeping current tracked set"),
        }
    }

    async fn reload_tracked(&mut self) {
        match wallet_repo::get_tracked_wallets(&self.pool).await {
            Ok(wallets) => self.set_tracked(&wallets).await,
            Err(e) => tracing::error!(error = %e, "Failed to load tracked wallets"),
        }
    }

    async fn set_tracked(&mut self, wallets: &[Wallet]) {
        self.tracked = wallets
            .iter()
            .filter(|w| !w.is_blacklisted)
            .map(TrackedWallet::from)
            .collect();
        self.monitor.retain_wallets(&self.tracked).await;
        gauge!("tracked_wallets").set(self.tracked.len() as f64);
    }

    async fn drop_wallet(&mut self, wallet: &str) {
        self.tracked.retain(|w| w.address != wallet);
        self.monitor.forget(wallet).await;
        gauge!("tracked_wallets").set(self.tracked.len() as f64);
    }

    /// One pass: poll, blacklist manipulators, execute, then the periodic
    /// re-check and reseed. Every wallet blacklisted along the way leaves the
    /// tracked set before the next poll. Never returns an error.
    pub async fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        self.ticks += 1;
        let mut report = TickReport {
            tracked: self.tracked.len(),
            ..TickReport::default()
        };

        if self.tracked.is_empty() {
            tracing::debug!("No tracked wallets, skipping poll");
        } else {
            let outcome = self.monitor.poll(&self.tracked).await;

            for wallet in &outcome.flagged {
                match wallet_repo::blacklist_wallet(&self.pool, wallet, MANIPULATION_REASON).await {
                    Ok(newly) => {
                        if newly {
                            counter!("wallets_blacklisted").increment(1);
                        }
                        tracing::warn!(wallet = %wallet, "Wallet blacklisted for manipulation");
                    }
                    Err(e) => {
                        tracing::error!(wallet = %wallet, error = %e, "Failed to blacklist wallet");
                    }
                }
                report.blacklisted.push(wallet.clone());
            }
            for wallet in &outcome.flagged {
                self.drop_wallet(wallet).await;
            }

            report.signals = outcome.signals.len();
            report.summary = self.executor.process_batch(outcome.signals).await;
            for wallet in &report.summary.blacklisted {
                self.drop_wallet(wallet).await;
            }
            report.blacklisted.extend(report.summary.blacklisted.iter().cloned());
        }

        let every = self.config.blacklist_check_every_ticks.max(1);
        if self.ticks % every == 0 {
            let dropped = self.executor.recheck_copy_history().await;
            for wallet in &dropped {
                self.drop_wallet(wallet).await;
            }
            report.blacklisted.extend(dropped);
            self.reselect().await;
            report.reselected = true;
        }

        let reseed_due = self
            .last_discovery
            .map(|t| t.elapsed() >= Duration::from_secs(self.config.reseed_interval_secs))
            .unwrap_or(true);
        if reseed_due {
            tracing::info!("Reseeding wallets from leaderboard");
            self.discover().await;
            report.reselected = true;
        }

        histogram!("tick_latency_seconds").record(started.elapsed().as_secs_f64());
        report
    }

    /// Initialize, then tick forever on the poll interval.
    pub async fn run(mut self) {
        self.initialize().await;

        let mut ticker = interval(Duration::from_secs(self.config.poll_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = self.tick().await;
            tracing::debug!(
                tick = self.ticks,
                tracked = report.tracked,
                signals = report.signals,
                placed = report.summary.placed,
                closed = report.summary.closed,
                blacklisted = report.blacklisted.len(),
                "Tick complete"
            );
        }
    }
}
