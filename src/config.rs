//! Sniper configuration loaded from TOML, with secrets resolved from the environment.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Top-level sniper configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SniperConfig {
    pub general: GeneralConfig,
    pub pool: PoolConfig,
    pub monitor: MonitorConfig,
    pub strategy: StrategyConfig,
    pub spam: SpamConfig,
    pub jito: JitoConfig,
    /// Never read from the TOML file; filled from environment variables.
    #[serde(skip)]
    pub confidential: ConfidentialConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Simulate swaps instead of submitting them
    pub dry_run: bool,
    /// Accept a single sniping task for the lifetime of the process
    pub one_shot_mode: bool,
    /// Minimum seconds between two price samples of a task
    pub price_sample_interval_sec: u64,
    /// How often shutdown re-checks the active task set
    pub active_tasks_polling_interval_ms: u64,
    /// Send retries handed to the swapper, 0 leaves the RPC default
    pub send_txn_retries: u32,
    /// Optional SQLite file recording task summaries
    pub summary_db_path: Option<String>,
    /// Base58 creators never sniped
    pub blacklisted_creators: Vec<String>,
    /// Quote balance (UI units) of the simulated dry-run wallet
    pub dry_run_quote_balance: Decimal,
    /// Capacity of the pool creation channel
    pub event_channel_capacity: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            one_shot_mode: false,
            price_sample_interval_sec: 1,
            active_tasks_polling_interval_ms: 1000,
            send_txn_retries: 0,
            summary_db_path: None,
            blacklisted_creators: Vec::new(),
            dry_run_quote_balance: dec!(100),
            event_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub require_symbol: bool,
    pub require_mint_disabled: bool,
    pub require_freeze_disabled: bool,
    /// Reject pools whose open time is still in the future
    pub require_open: bool,
    /// Reject markets created longer ago than this (seconds), 0 disables the check
    pub max_market_age_sec: u64,
    /// Creators known to have pulled liquidity before
    pub rugpull_creators: Vec<String>,
    /// Lower bound of the initial quote liquidity (UI units)
    pub min_quote_token_in_pool: Decimal,
    /// Upper bound of the initial quote liquidity (UI units)
    pub max_quote_token_in_pool: Decimal,
    /// Minimum share (%) of the base supply deposited in the pool
    pub min_pooled_token_percentage: Decimal,
    /// Attempts at reading the pool state before giving up
    pub liquidity_read_attempts: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            require_symbol: true,
            require_mint_disabled: true,
            require_freeze_disabled: true,
            require_open: true,
            max_market_age_sec: 0,
            rugpull_creators: Vec::new(),
            min_quote_token_in_pool: dec!(1),
            max_quote_token_in_pool: dec!(1000),
            min_pooled_token_percentage: dec!(50),
            liquidity_read_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub account_poll_interval_ms: u64,
    pub account_expiration_sec: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            account_poll_interval_ms: 500,
            account_expiration_sec: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Unrealized ROI (%) at which profits are taken
    pub take_profit_percentage: Decimal,
    /// Share (%) of the current position sold on take-profit
    pub take_profit_sell_percentage: Decimal,
    /// Unrealized loss (%) at which the position is cut
    pub stop_loss_percentage: Decimal,
    /// Share (%) of the current position sold on stop-loss
    pub stop_loss_sell_percentage: Decimal,
    /// Seconds after the buy-in block at which everything is sold
    pub hard_cash_out_time_sec: u64,
    pub buy_slippage: Decimal,
    pub sell_slippage: Decimal,
    pub buy_fee_micro_lamports: u64,
    pub sell_fee_micro_lamports: u64,
    /// Share (%) of the pooled quote liquidity to buy with
    pub quote_token_buy_in_percentage: Decimal,
    /// Lower bound of the buy-in (UI quote units)
    pub min_quote_token_in: Decimal,
    /// Upper bound of the buy-in (UI quote units)
    pub max_quote_token_in: Decimal,
    pub quote_tick_interval_ms: u64,
    /// Gate submissions on the Jito leader schedule
    pub jito_only: bool,
    pub max_slots_until_next_jito_leader: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            take_profit_percentage: dec!(50),
            take_profit_sell_percentage: dec!(50),
            stop_loss_percentage: dec!(30),
            stop_loss_sell_percentage: dec!(100),
            hard_cash_out_time_sec: 60,
            buy_slippage: dec!(10),
            sell_slippage: dec!(10),
            buy_fee_micro_lamports: 100_000,
            sell_fee_micro_lamports: 100_000,
            quote_token_buy_in_percentage: dec!(1),
            min_quote_token_in: dec!(0.01),
            max_quote_token_in: dec!(0.1),
            quote_tick_interval_ms: 200,
            jito_only: false,
            max_slots_until_next_jito_leader: 10,
        }
    }
}

impl StrategyConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.quote_tick_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpamConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub timeout_sec: u64,
    /// Fixed buy-in (UI quote units) of every raced buy
    pub buy_in_amount: Decimal,
    /// Number of raced sell-all transactions at hard cash-out
    pub num_cash_out_txns: usize,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 100,
            timeout_sec: 5,
            buy_in_amount: dec!(0.01),
            num_cash_out_txns: 3,
        }
    }
}

impl SpamConfig {
    /// Number of buy attempts raced within the spam timeout.
    pub fn buy_attempts(&self) -> usize {
        ((self.timeout_sec * 1000) / self.interval_ms.max(1)).max(1) as usize
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JitoConfig {
    /// Use the realtime next-leader feed instead of periodic snapshots
    pub realtime_schedule: bool,
    pub snapshot_update_interval_sec: u64,
    pub realtime_request_interval_ms: u64,
}

impl Default for JitoConfig {
    fn default() -> Self {
        Self {
            realtime_schedule: true,
            snapshot_update_interval_sec: 60,
            realtime_request_interval_ms: 200,
        }
    }
}

/// Secrets initialised from environment variables.
#[derive(Debug, Clone, Default)]
pub struct ConfidentialConfig {
    pub solana_rpc_uri: Option<String>,
    pub jito_api_uri: Option<String>,
    pub wallet_private_key: Option<String>,
}

impl ConfidentialConfig {
    pub fn from_env() -> Self {
        Self {
            solana_rpc_uri: std::env::var("SOLANA_RPC_URI").ok(),
            jito_api_uri: std::env::var("JITO_API_URI").ok(),
            wallet_private_key: std::env::var("WALLET_PRIVATE_KEY").ok(),
        }
    }
}

impl SniperConfig {
    /// Load configuration from a TOML file and the process environment.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.confidential = ConfidentialConfig::from_env();
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: SniperConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the strategy misbehave.
    pub fn validate(&self) -> Result<()> {
        let strategy = &self.strategy;
        if strategy.min_quote_token_in > strategy.max_quote_token_in {
            bail!(
                "min_quote_token_in {} exceeds max_quote_token_in {}",
                strategy.min_quote_token_in,
                strategy.max_quote_token_in
            );
        }
        let pool = &self.pool;
        if pool.min_quote_token_in_pool > pool.max_quote_token_in_pool {
            bail!(
                "min_quote_token_in_pool {} exceeds max_quote_token_in_pool {}",
                pool.min_quote_token_in_pool,
                pool.max_quote_token_in_pool
            );
        }
        for (name, value) in [
            ("min_pooled_token_percentage", pool.min_pooled_token_percentage),
            ("take_profit_sell_percentage", strategy.take_profit_sell_percentage),
            ("stop_loss_sell_percentage", strategy.stop_loss_sell_percentage),
            ("quote_token_buy_in_percentage", strategy.quote_token_buy_in_percentage),
            ("buy_slippage", strategy.buy_slippage),
            ("sell_slippage", strategy.sell_slippage),
        ] {
            if value < Decimal::ZERO || value > dec!(100) {
                bail!("{name} must be within [0, 100], got {value}");
            }
        }
        if strategy.quote_tick_interval_ms == 0 {
            bail!("quote_tick_interval_ms must be positive");
        }
        if self.spam.enabled && self.spam.interval_ms == 0 {
            bail!("spam.interval_ms must be positive when spam mode is enabled");
        }
        Ok(())
    }
}
