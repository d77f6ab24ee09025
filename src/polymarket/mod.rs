pub mod data_client;
pub mod gamma_client;
pub mod gateway;
pub mod types;

pub use data_client::DataClient;
pub use gamma_client::GammaClient;
pub use gateway::OrderGateway;
pub use types::{ApiLeaderboardEntry, ApiPosition, ApiUserTrade};
