pub mod consensus;
pub mod manipulation;
pub mod scorer;

pub use consensus::{cluster_group, reduce, CoEntryTracker, GroupVerdict};
pub use manipulation::ManipulationTracker;
pub use scorer::{matched_profit_factor, score_wallet, WalletScore};
