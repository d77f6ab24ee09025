use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

const COUNTERS: &[&str] = &[
    "signals_emitted",
    "consensus_signals",
    "copy_trades_placed",
    "copy_trades_failed",
    "copy_trades_closed",
    "wallets_blacklisted",
    "position_fetches",
    "position_fetches_rate_limited",
];

/// Install the Prometheus recorder and pre-register every series so a
/// scrape sees them before the first tick.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;

    register_defaults();
    Ok(handle)
}

pub(crate) fn register_defaults() {
    for name in COUNTERS {
        counter!(*name).absolute(0);
    }

    gauge!("tracked_wallets").set(0.0);
    gauge!("daily_exposure").set(0.0);

    histogram!("tick_latency_seconds").record(0.0);
}
