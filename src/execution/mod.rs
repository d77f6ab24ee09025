pub mod copy_engine;
pub mod order_executor;
pub mod position_sizer;
pub mod risk_manager;

pub use copy_engine::{BatchSummary, CopyExecutor, ExecutionOutcome, ExposureLedger};
pub use order_executor::{ExecutionError, OrderExecutor, OrderResult};
pub use position_sizer::{copy_size, SizingLimits};
pub use risk_manager::{evaluate_entry, CopyLimits, EntryContext, SkipReason};
