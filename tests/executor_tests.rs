mod common;

use std::path::PathBuf;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use whalecopy::db::copy_trade_repo::{self, NewCopyTrade};
use whalecopy::db::{wallet_repo, AuditLog};
use whalecopy::execution::{CopyExecutor, CopyLimits, OrderExecutor};
use whalecopy::models::{copy_status, ConsensusSignal, Signal, SignalKind, WalletSignal};
use whalecopy::polymarket::GammaClient;

fn audit_path() -> PathBuf {
    std::env::temp_dir().join(format!("whalecopy-exec-{}.jsonl", Uuid::new_v4()))
}

fn executor(pool: &PgPool, audit: &PathBuf) -> CopyExecutor {
    // Unreachable metadata host: market end falls back to the feed.
    let gamma = GammaClient::new(reqwest::Client::new()).with_base_url("http://127.0.0.1:1");
    CopyExecutor::new(
        pool.clone(),
        OrderExecutor::dry_run(),
        gamma,
        CopyLimits::default(),
        AuditLog::new(audit),
    )
}

fn wallet_signal(kind: SignalKind, wallet: &str, price: Decimal) -> WalletSignal {
    WalletSignal {
        kind,
        wallet: wallet.into(),
        wallet_score: Decimal::from(80),
        market_id: "M1".into(),
        outcome: "Yes".into(),
        asset_id: "token-m1-yes".into(),
        title: Some("Will it rain?".into()),
        size: Decimal::from(1_000),
        size_delta: Decimal::from(1_000),
        value_delta: Decimal::from(500),
        whale_price: Decimal::new(50, 2),
        current_price: price,
        market_end: Some(Utc::now() + Duration::days(2)),
        detected_at: Utc::now(),
    }
}

fn entry(wallet: &str) -> Signal {
    Signal::Consensus(ConsensusSignal {
        market_id: "M1".into(),
        outcome: "Yes".into(),
        representative: wallet_signal(SignalKind::NewEntry, wallet, Decimal::new(50, 2)),
        wallets: vec![wallet.into()],
        dropped: vec![],
        independent_count: 1,
    })
}

#[tokio::test]
async fn test_entry_then_exit_in_dry_run() {
    let Some(db) = common::setup_test_db().await else { return };
    let pool = &db.pool;
    common::seed_wallet(pool, "0xaaa", 80).await;
    let audit = audit_path();
    let exec = executor(pool, &audit);

    let summary = exec.process_batch(vec![entry("0xaaa")]).await;
    assert_eq!(summary.placed, 1);

    let filled = copy_trade_repo::list_copy_trades(pool, Some(copy_status::FILLED), 10).await.unwrap();
    assert_eq!(filled.len(), 1);
    // $500 whale move × 5%
    assert_eq!(filled[0].size, Decimal::from(25));
    assert!(filled[0].dry_run);
    assert!(filled[0].order_id.as_deref().unwrap().starts_with("dry-run-"));
    assert_eq!(exec.exposure().await, Decimal::from(25));

    let exit = Signal::Exit(wallet_signal(SignalKind::ExitFull, "0xaaa", Decimal::new(60, 2)));
    let summary = exec.process_batch(vec![exit]).await;
    assert_eq!(summary.closed, 1);

    let won = copy_trade_repo::list_copy_trades(pool, Some(copy_status::WON), 10).await.unwrap();
    assert_eq!(won.len(), 1);
    // 50 shares × $0.10
    assert_eq!(won[0].realized_pnl, Some(Decimal::from(5)));
    assert_eq!(exec.exposure().await, Decimal::ZERO);

    let contents = tokio::fs::read_to_string(&audit).await.unwrap();
    let events: Vec<String> = contents
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["event"].to_string())
        .collect();
    assert_eq!(events, vec!["\"placed\"", "\"closed\""]);
    let _ = tokio::fs::remove_file(&audit).await;
}

#[tokio::test]
async fn test_repeat_entry_is_skipped() {
    let Some(db) = common::setup_test_db().await else { return };
    let pool = &db.pool;
    common::seed_wallet(pool, "0xaaa", 80).await;
    let audit = audit_path();
    let exec = executor(pool, &audit);

    assert_eq!(exec.process_batch(vec![entry("0xaaa")]).await.placed, 1);
    let summary = exec.process_batch(vec![entry("0xaaa")]).await;
    assert_eq!(summary.placed, 0);
    assert_eq!(summary.skipped, 1);

    let _ = tokio::fs::remove_file(&audit).await;
}

#[tokio::test]
async fn test_exit_without_open_copies_is_a_no_op() {
    let Some(db) = common::setup_test_db().await else { return };
    let pool = &db.pool;
    let audit = audit_path();
    let exec = executor(pool, &audit);

    let exit = Signal::Exit(wallet_signal(SignalKind::ExitPartial, "0xaaa", Decimal::new(60, 2)));
    let summary = exec.process_batch(vec![exit]).await;
    assert_eq!(summary.closed, 0);
    assert_eq!(summary.abandoned, 0);
}

#[tokio::test]
async fn test_poor_copy_history_blacklists_source() {
    let Some(db) = common::setup_test_db().await else { return };
    let pool = &db.pool;
    common::seed_wallet(pool, "0xaaa", 80).await;

    for i in 0..5 {
        let t = copy_trade_repo::insert_pending(
            pool,
            &NewCopyTrade {
                wallet_address: "0xaaa".into(),
                market_id: format!("OLD{i}"),
                outcome: "Yes".into(),
                asset_id: format!("old-{i}"),
                side: "BUY".into(),
                size: Decimal::from(10),
                shares: Decimal::from(20),
                entry_price: Decimal::new(50, 2),
                whale_price: Decimal::new(50, 2),
                entry_slippage: Decimal::ZERO,
                independent_count: 1,
                dry_run: true,
            },
        )
        .await
        .unwrap();
        copy_trade_repo::close_trade(pool, t.id, Decimal::new(40, 2), Decimal::from(-2), Utc::now() - Duration::days(1))
            .await
            .unwrap();
    }

    let audit = audit_path();
    let exec = executor(pool, &audit);
    let summary = exec.process_batch(vec![entry("0xaaa")]).await;
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.blacklisted, vec!["0xaaa".to_string()]);

    // A second entry in the same state skips without reporting it again.
    let summary = exec.process_batch(vec![entry("0xaaa")]).await;
    assert!(summary.blacklisted.is_empty());

    let wallet = wallet_repo::get_wallet(pool, "0xaaa").await.unwrap().unwrap();
    assert!(wallet.is_blacklisted);

    // Already blacklisted, so the periodic re-check reports nothing new.
    assert!(exec.recheck_copy_history().await.is_empty());
    let _ = tokio::fs::remove_file(&audit).await;
}

#[tokio::test]
async fn test_forced_dry_run_is_visible_through_shared_flag() {
    let Some(db) = common::setup_test_db().await else { return };
    let audit = audit_path();
    let gamma = GammaClient::new(reqwest::Client::new()).with_base_url("http://127.0.0.1:1");
    let exec = CopyExecutor::new(
        db.pool.clone(),
        OrderExecutor::new(None, false),
        gamma,
        CopyLimits::default(),
        AuditLog::new(&audit),
    );
    let flag = exec.simulation_flag();
    assert!(!flag.load(std::sync::atomic::Ordering::Relaxed));

    exec.force_dry_run();
    assert!(exec.is_dry_run());
    assert!(flag.load(std::sync::atomic::Ordering::Relaxed));
}
