//! pool-sniper - Solana liquidity pool launch sniper
//!
//! This crate detects new liquidity pools and runs a timed entry/exit strategy
//! against each of them: eligibility checks, a buy-in, take-profit / stop-loss
//! monitoring and a forced cash-out, with every result accounted for.

pub mod types;
pub mod config;
pub mod trade;
pub mod task;
pub mod jito;
pub mod monitor;
pub mod dispatcher;
pub mod analytics;

// Re-export main types for convenience
pub use config::SniperConfig;
pub use dispatcher::{Dispatcher, DispatcherDeps};
pub use task::{SnipingTask, TaskError, TaskSummary};
pub use types::{PoolCreation, PoolType, SplToken};
