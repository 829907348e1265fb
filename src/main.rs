//! Main entry point for the pool-sniper dry-run demo
//!
//! Replays synthetic pool launches through the dispatcher. Quotes come from a
//! random-walk market and swaps settle against a simulated wallet.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use pool_sniper::analytics::{
    InMemorySnipingAnalyticalService, SnipingAnalyticalService, SqliteSnipingAnalyticalService,
};
use pool_sniper::config::{ConfidentialConfig, SniperConfig};
use pool_sniper::dispatcher::{Dispatcher, DispatcherDeps, InMemoryCreatorBlacklist, ReplayEventSource};
use pool_sniper::task::{BasicSnipingCriteria, PoolLiquidityReader};
use pool_sniper::trade::{
    DryRunSwapperFactory, Quote, SwapOptions, SwapSummary, TokenSwapper, TokenSwapperFactory,
};
use pool_sniper::types::{PoolCreation, PoolLiquidity, PoolType, SplToken};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use solana_sdk::pubkey::Pubkey;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Quote liquidity (UI units) of every demo pool.
const DEMO_POOLED_QUOTE: Decimal = dec!(85);

#[derive(Parser, Debug)]
#[command(name = "pool-sniper", about = "Snipes newly launched liquidity pools")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "POOL_SNIPER_CONFIG")]
    config: Option<String>,

    /// Force dry-run mode regardless of the configuration
    #[arg(long)]
    dry_run: bool,

    /// Number of synthetic pool launches to replay
    #[arg(long, default_value_t = 3)]
    demo_pools: usize,

    /// Seconds to accept pools before shutting down
    #[arg(long, default_value_t = 10)]
    run_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    dotenv::dotenv().ok();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => SniperConfig::load(path)?,
        None => SniperConfig {
            confidential: ConfidentialConfig::from_env(),
            ..SniperConfig::default()
        },
    };
    if args.dry_run {
        config.general.dry_run = true;
    }
    if !config.general.dry_run {
        bail!("Only dry-run mode is available in this build, pass --dry-run");
    }
    info!("Starting pool-sniper in dry-run mode");

    let analytics: Arc<dyn SnipingAnalyticalService> = match &config.general.summary_db_path {
        Some(path) => Arc::new(SqliteSnipingAnalyticalService::new(path).await?),
        None => Arc::new(InMemorySnipingAnalyticalService::new()),
    };
    let pools = demo_pools(args.demo_pools);
    let config = Arc::new(config);

    let dispatcher = Dispatcher::new(
        config.clone(),
        DispatcherDeps {
            event_source: Arc::new(ReplayEventSource::new(pools, Duration::from_millis(500))),
            blacklist: Arc::new(InMemoryCreatorBlacklist::from_base58(
                &config.general.blacklisted_creators,
            )),
            criteria: Arc::new(BasicSnipingCriteria::new(
                config.pool.clone(),
                Arc::new(DemoPoolLiquidity),
            )),
            swapper_factory: DryRunSwapperFactory::new(
                RandomWalkMarketFactory,
                config.general.dry_run_quote_balance,
            ),
            analytics,
            leader_schedule: None,
        },
    )?;

    let run_handle = tokio::spawn(dispatcher.clone().run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = tokio::time::sleep(Duration::from_secs(args.run_secs)) => {}
    }

    dispatcher.stop().await;
    run_handle.await??;

    info!("Demo completed.");
    Ok(())
}

/// Synthetic launches of fresh, already open pools.
fn demo_pools(count: usize) -> Vec<PoolCreation> {
    let now = Utc::now();
    (1..=count)
        .map(|i| PoolCreation {
            pool_type: PoolType::RaydiumAmmV4,
            pool_id: Pubkey::new_unique(),
            market_id: Pubkey::new_unique(),
            base_token: SplToken {
                mint: Pubkey::new_unique(),
                decimals: 6,
                symbol: Some(format!("DEMO{}", i)),
                name: Some(format!("Demo Token {}", i)),
                mint_disabled: true,
                freeze_disabled: true,
            },
            quote_token: SplToken::wsol(),
            open_time: now.timestamp() - 1,
            creator: Pubkey::new_unique(),
            market_created_at: now.timestamp() - 5,
            observed_at: now,
        })
        .collect()
}

/// Every demo pool launches with 85 WSOL against 80% of its token supply.
struct DemoPoolLiquidity;

#[async_trait]
impl PoolLiquidityReader for DemoPoolLiquidity {
    async fn read_liquidity(&self, pool: &PoolCreation) -> Result<PoolLiquidity> {
        let base_supply = pool.base_token.to_raw_amount(dec!(1000000000))?;
        Ok(PoolLiquidity {
            quote_vault_amount: pool.quote_token.to_raw_amount(DEMO_POOLED_QUOTE)?,
            swap_quote_out_amount: Decimal::ZERO,
            swap_quote_in_amount: Decimal::ZERO,
            base_vault_amount: base_supply * dec!(0.8),
            base_supply,
        })
    }
}

struct RandomWalkMarketFactory;

impl TokenSwapperFactory for RandomWalkMarketFactory {
    type Swapper = RandomWalkMarket;

    fn create_swapper(&self, pool: &PoolCreation) -> Result<RandomWalkMarket> {
        Ok(RandomWalkMarket {
            base_token: pool.base_token.clone(),
            quote_token: pool.quote_token.clone(),
            // 0.00002 WSOL per token, in raw units
            raw_price: Mutex::new(dec!(20)),
        })
    }
}

/// Quote-only market whose price drifts randomly on every read.
struct RandomWalkMarket {
    base_token: SplToken,
    quote_token: SplToken,
    /// Raw quote units per raw base unit
    raw_price: Mutex<Decimal>,
}

impl RandomWalkMarket {
    fn step(&self) -> Decimal {
        let change = Decimal::from(rand::thread_rng().gen_range(-5..=6)) / Decimal::ONE_HUNDRED;
        let mut price = self.raw_price.lock().unwrap_or_else(|e| e.into_inner());
        *price *= Decimal::ONE + change;
        *price
    }

    fn quote(&self, amount_in: Decimal, amount_out: Decimal, slippage_pct: Decimal, raw_price: Decimal) -> Quote<()> {
        Quote {
            amount_in,
            min_amount_out: (amount_out * (Decimal::ONE_HUNDRED - slippage_pct) / Decimal::ONE_HUNDRED).floor(),
            base_token_price: self.ui_price(raw_price),
            payload: (),
        }
    }

    fn ui_price(&self, raw_price: Decimal) -> Decimal {
        self.quote_token
            .to_ui_amount(raw_price)
            .checked_div(self.base_token.to_ui_amount(Decimal::ONE))
            .unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl TokenSwapper for RandomWalkMarket {
    type Payload = ();

    async fn get_buy_quote(&self, amount_in: Decimal, slippage_pct: Decimal) -> Result<Quote<()>> {
        let raw_price = self.step();
        Ok(self.quote(amount_in, amount_in / raw_price, slippage_pct, raw_price))
    }

    async fn get_sell_quote(&self, amount_in: Decimal, slippage_pct: Decimal) -> Result<Quote<()>> {
        let raw_price = self.step();
        Ok(self.quote(amount_in, amount_in * raw_price, slippage_pct, raw_price))
    }

    async fn buy_token(&self, _quote: Quote<()>, _options: &SwapOptions) -> Result<SwapSummary> {
        bail!("The random-walk market only quotes")
    }

    async fn sell_token(&self, _quote: Quote<()>, _options: &SwapOptions) -> Result<SwapSummary> {
        bail!("The random-walk market only quotes")
    }

    async fn get_price_in_quote(&self) -> Result<Decimal> {
        Ok(self.ui_price(self.step()))
    }

    async fn get_pool_quote_reserve(&self) -> Result<Decimal> {
        self.quote_token.to_raw_amount(DEMO_POOLED_QUOTE)
    }
}
