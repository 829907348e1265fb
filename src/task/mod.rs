//! Task module - the per-pool sniping state machine and its building blocks.

pub mod errors;
pub mod types;
pub mod spammer;
pub mod criteria;
pub mod sniping_task;

pub use criteria::{BasicSnipingCriteria, PoolLiquidityReader, SnipingCriteria};
pub use errors::TaskError;
pub use sniping_task::{SnipingTask, TaskContext};
pub use spammer::{SpamProgress, Spammer, SpammerInput};
pub use types::{PriceSample, TaskState, TaskSummary};
