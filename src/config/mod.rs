use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

const DEFAULT_AUDIT_LOG_PATH: &str = "data/copy_trades.jsonl";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // Execution wallet; without a key every order is simulated
    pub private_key: Option<String>,
    pub dry_run: bool,
    pub audit_log_path: String,

    // Discovery
    pub leaderboard_categories: Vec<String>,
    pub leaderboard_periods: Vec<String>,
    pub leaderboard_top_n: u32,
    pub score_history_limit: u32,
    pub max_tracked_wallets: i64,
    pub min_score_to_track: Decimal,

    // Monitoring
    pub poll_interval_secs: u64,
    pub min_notional: Decimal,
    pub cache_ttl_secs: u64,
    pub requests_per_minute: usize,
    pub max_concurrent_fetches: usize,
    pub request_timeout_secs: u64,
    pub min_consensus: usize,
    pub manipulation_window_secs: i64,
    pub manipulation_threshold: u32,

    // Sizing + gates
    pub bankroll: Decimal,
    pub copy_fraction: Decimal,
    pub max_per_trade: Decimal,
    pub max_bankroll_fraction: Decimal,
    pub daily_cap: Decimal,
    pub min_ticket: Decimal,
    pub max_slippage: Decimal,
    pub max_price: Decimal,
    pub min_market_duration_secs: i64,
    pub blacklist_min_copies: i64,
    pub blacklist_min_win_rate: Decimal,

    // Backtest
    pub backtest_lookback_days: i64,
    pub backtest_min_trades: usize,
    pub backtest_min_win_rate: Decimal,

    // Scheduling
    pub reseed_interval_secs: u64,
    pub blacklist_check_every_ticks: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,

            private_key: env::var("PRIVATE_KEY").ok().filter(|k| !k.is_empty()),
            dry_run: parse_or("DRY_RUN", true),
            audit_log_path: env::var("AUDIT_LOG_PATH")
                .unwrap_or_else(|_| DEFAULT_AUDIT_LOG_PATH.into()),

            leaderboard_categories: parse_list(
                "LEADERBOARD_CATEGORIES",
                &["OVERALL", "POLITICS", "SPORTS", "CRYPTO"],
            ),
            leaderboard_periods: parse_list("LEADERBOARD_PERIODS", &["MONTH", "ALL"]),
            leaderboard_top_n: parse_or("LEADERBOARD_TOP_N", 50),
            score_history_limit: parse_or("SCORE_HISTORY_LIMIT", 500),
            max_tracked_wallets: parse_or("MAX_TRACKED_WALLETS", 20),
            min_score_to_track: parse_or("MIN_SCORE_TO_TRACK", Decimal::from(40)),

            poll_interval_secs: parse_or("POLL_INTERVAL_SECS", 30),
            min_notional: parse_or("MIN_NOTIONAL", Decimal::from(500)),
            cache_ttl_secs: parse_or("CACHE_TTL_SECS", 15),
            requests_per_minute: parse_or("REQUESTS_PER_MINUTE", 60),
            max_concurrent_fetches: parse_or("MAX_CONCURRENT_FETCHES", 8),
            request_timeout_secs: parse_or("REQUEST_TIMEOUT_SECS", 10),
            min_consensus: parse_or("MIN_CONSENSUS", 1),
            manipulation_window_secs: parse_or("MANIPULATION_WINDOW_SECS", 300),
            manipulation_threshold: parse_or("MANIPULATION_THRESHOLD", 3),

            bankroll: parse_or("BANKROLL", Decimal::from(1_000)),
            copy_fraction: parse_or("COPY_FRACTION", Decimal::new(5, 2)),
            max_per_trade: parse_or("MAX_PER_TRADE", Decimal::from(50)),
            max_bankroll_fraction: parse_or("MAX_BANKROLL_FRACTION", Decimal::new(5, 2)),
            daily_cap: parse_or("DAILY_CAP", Decimal::from(200)),
            min_ticket: parse_or("MIN_TICKET", Decimal::from(5)),
            max_slippage: parse_or("MAX_SLIPPAGE", Decimal::new(15, 2)),
            max_price: parse_or("MAX_PRICE", Decimal::new(95, 2)),
            min_market_duration_secs: parse_or("MIN_MARKET_DURATION_SECS", 3_600),
            blacklist_min_copies: parse_or("BLACKLIST_MIN_COPIES", 5),
            blacklist_min_win_rate: parse_or("BLACKLIST_MIN_WIN_RATE", Decimal::new(40, 2)),

            backtest_lookback_days: parse_or("BACKTEST_LOOKBACK_DAYS", 30),
            backtest_min_trades: parse_or("BACKTEST_MIN_TRADES", 20),
            backtest_min_win_rate: parse_or("BACKTEST_MIN_WIN_RATE", Decimal::new(55, 2)),

            reseed_interval_secs: parse_or("RESEED_INTERVAL_SECS", 86_400),
            blacklist_check_every_ticks: parse_or("BLACKLIST_CHECK_EVERY_TICKS", 20),
        })
    }

    /// Returns true if orders can actually be signed and submitted.
    pub fn is_live(&self) -> bool {
        !self.dry_run && self.private_key.is_some()
    }
}

/// Read an env var and parse it, falling back to `default` when unset or malformed.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_list(key: &str, default: &[&str]) -> Vec<String> {
    let items: Vec<String> = env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    if items.is_empty() {
        default.iter().map(|s| s.to_string()).collect()
    } else {
        items
    }
}
