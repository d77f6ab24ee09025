pub mod backtester;
pub mod orchestrator;
pub mod position_monitor;
pub mod whale_seeder;

pub use orchestrator::{Orchestrator, TickReport};
pub use position_monitor::{MonitorConfig, PositionMonitor, TrackedWallet};
