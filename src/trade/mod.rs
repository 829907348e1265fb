//! Trade module - position accounting and the token swapper seam.

pub mod position_manager;
pub mod swapper;
pub mod dry_run;

pub use position_manager::PositionManager;
pub use swapper::{
    Quote, SwapDirection, SwapOptions, SwapSummary, TokenSwapper, TokenSwapperFactory,
};
pub use dry_run::{DryRunSwapper, DryRunSwapperFactory, SimulatedWallet};
