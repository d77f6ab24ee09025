use std::time::Duration;

use whalecopy::api::create_router;
use whalecopy::config::AppConfig;
use whalecopy::db::{self, AuditLog};
use whalecopy::execution::{CopyExecutor, CopyLimits, OrderExecutor};
use whalecopy::polymarket::{DataClient, GammaClient, OrderGateway};
use whalecopy::services::{MonitorConfig, Orchestrator, PositionMonitor};
use whalecopy::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);
    let metrics_handle = whalecopy::metrics::init_metrics()?;

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(&config.database_url).await?;
    tracing::info!("Database connected");

    // --- HTTP clients ---
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let data = DataClient::with_timeout(timeout)?;
    let gamma = GammaClient::with_timeout(timeout)?;

    // --- Order gateway: live only with a key and DRY_RUN=false ---
    let gateway = match config.private_key.as_deref() {
        Some(key) if config.is_live() => match OrderGateway::connect(key, timeout).await {
            Ok(g) => {
                tracing::info!("CLOB gateway authenticated, live trading enabled");
                Some(g)
            }
            Err(e) => {
                tracing::error!(error = %e, "CLOB authentication failed, falling back to dry-run");
                None
            }
        },
        _ => {
            tracing::info!(dry_run = config.dry_run, "Running in dry-run mode");
            None
        }
    };

    let simulate = gateway.is_none();
    let executor = CopyExecutor::new(
        pool.clone(),
        OrderExecutor::new(gateway, simulate),
        gamma,
        CopyLimits::from_config(&config),
        AuditLog::new(&config.audit_log_path),
    );
    let dry_run = executor.simulation_flag();

    let monitor = PositionMonitor::new(data.clone(), MonitorConfig::from_config(&config));
    let orchestrator = Orchestrator::new(pool.clone(), config.clone(), data, monitor, executor);
    tokio::spawn(orchestrator.run());

    // --- Status API ---
    let state = AppState {
        db: pool,
        config,
        metrics_handle,
        dry_run,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();
}
