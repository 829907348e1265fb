//! Hand-written collaborators shared by the integration tests.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use pool_sniper::config::SniperConfig;
use pool_sniper::jito::{LeaderSchedule, LeaderScheduleError, NextLeaderSlot};
use pool_sniper::task::{SnipingCriteria, TaskError};
use pool_sniper::trade::{
    Quote, SwapDirection, SwapOptions, SwapSummary, TokenSwapper, TokenSwapperFactory,
};
use pool_sniper::types::{PoolCreation, PoolType, SplToken};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use solana_sdk::pubkey::Pubkey;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn test_pool() -> PoolCreation {
    let now = Utc::now();
    PoolCreation {
        pool_type: PoolType::RaydiumAmmV4,
        pool_id: Pubkey::new_unique(),
        market_id: Pubkey::new_unique(),
        base_token: SplToken {
            mint: Pubkey::new_unique(),
            decimals: 6,
            symbol: Some("TEST".to_string()),
            name: Some("Test Token".to_string()),
            mint_disabled: true,
            freeze_disabled: true,
        },
        quote_token: SplToken::wsol(),
        open_time: now.timestamp() - 1,
        creator: Pubkey::new_unique(),
        market_created_at: now.timestamp() - 10,
        observed_at: now,
    }
}

/// Fast timings: 10ms ticks, a sample every tick, cash-out one second after the buy.
pub fn test_config() -> SniperConfig {
    let mut config = SniperConfig::default();
    config.general.price_sample_interval_sec = 0;
    config.general.active_tasks_polling_interval_ms = 10;
    config.strategy.quote_tick_interval_ms = 10;
    config.strategy.hard_cash_out_time_sec = 1;
    config.strategy.take_profit_percentage = dec!(50);
    config.strategy.take_profit_sell_percentage = dec!(50);
    config.strategy.stop_loss_percentage = dec!(30);
    config.strategy.stop_loss_sell_percentage = dec!(100);
    config.strategy.buy_slippage = Decimal::ZERO;
    config.strategy.sell_slippage = Decimal::ZERO;
    config.strategy.min_quote_token_in = dec!(0.01);
    config.strategy.max_quote_token_in = dec!(0.1);
    config.spam.interval_ms = 10;
    config.spam.timeout_sec = 1;
    config
}

#[derive(Default)]
struct MarketState {
    /// Raw quote units per raw base unit
    raw_price: Mutex<Decimal>,
    price_after_buy: Mutex<Option<Decimal>>,
    wallet: Mutex<(Decimal, Decimal)>,
    buy_calls: AtomicUsize,
    sell_calls: AtomicUsize,
    failing_buys: AtomicUsize,
    failing_sells: AtomicUsize,
    failing_sell_quotes: AtomicUsize,
    failing_prices: AtomicUsize,
    price_calls: AtomicUsize,
    panic_on_sizing: AtomicBool,
    signatures: AtomicUsize,
}

/// Constant-price market settling against its own wallet. Clones share state.
#[derive(Clone)]
pub struct MockSwapper {
    state: Arc<MarketState>,
}

impl MockSwapper {
    /// Starts at 20 raw quote per raw base with 1000 WSOL in the wallet.
    pub fn new() -> Self {
        let state = MarketState::default();
        *state.raw_price.lock().unwrap() = dec!(20);
        *state.wallet.lock().unwrap() = (Decimal::ZERO, dec!(1000000000000));
        Self { state: Arc::new(state) }
    }

    pub fn set_price_after_buy(&self, raw_price: Decimal) -> &Self {
        *self.state.price_after_buy.lock().unwrap() = Some(raw_price);
        self
    }

    pub fn fail_next_buys(&self, count: usize) -> &Self {
        self.state.failing_buys.store(count, Ordering::SeqCst);
        self
    }

    pub fn fail_next_sells(&self, count: usize) -> &Self {
        self.state.failing_sells.store(count, Ordering::SeqCst);
        self
    }

    pub fn fail_next_sell_quotes(&self, count: usize) -> &Self {
        self.state.failing_sell_quotes.store(count, Ordering::SeqCst);
        self
    }

    pub fn fail_next_prices(&self, count: usize) -> &Self {
        self.state.failing_prices.store(count, Ordering::SeqCst);
        self
    }

    pub fn panic_on_sizing(&self) -> &Self {
        self.state.panic_on_sizing.store(true, Ordering::SeqCst);
        self
    }

    pub fn buy_calls(&self) -> usize {
        self.state.buy_calls.load(Ordering::SeqCst)
    }

    pub fn sell_calls(&self) -> usize {
        self.state.sell_calls.load(Ordering::SeqCst)
    }

    /// Price reads, failed ones included.
    pub fn price_calls(&self) -> usize {
        self.state.price_calls.load(Ordering::SeqCst)
    }

    /// Raw base amount held by the wallet.
    pub fn base_balance(&self) -> Decimal {
        self.state.wallet.lock().unwrap().0
    }

    fn price(&self) -> Decimal {
        *self.state.raw_price.lock().unwrap()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn settle(&self, direction: SwapDirection, amount_in: Decimal, amount_out: Decimal) -> Result<SwapSummary> {
        let mut wallet = self.state.wallet.lock().unwrap();
        let (pre_base, pre_quote) = *wallet;
        match direction {
            SwapDirection::Buy => {
                if pre_quote < amount_in {
                    bail!("insufficient quote balance");
                }
                *wallet = (pre_base + amount_out, pre_quote - amount_in);
            }
            SwapDirection::Sell => {
                if pre_base < amount_in {
                    bail!("insufficient base balance");
                }
                *wallet = (pre_base - amount_in, pre_quote + amount_out);
            }
        }
        let id = self.state.signatures.fetch_add(1, Ordering::SeqCst);
        Ok(SwapSummary {
            signature: format!("{}-{}", direction, id),
            direction,
            pre_base_amount: pre_base,
            post_base_amount: wallet.0,
            pre_quote_amount: pre_quote,
            post_quote_amount: wallet.1,
            block_timestamp: Utc::now().timestamp(),
        })
    }
}

#[async_trait]
impl TokenSwapper for MockSwapper {
    type Payload = ();

    async fn get_buy_quote(&self, amount_in: Decimal, slippage_pct: Decimal) -> Result<Quote<()>> {
        let price = self.price();
        let out = (amount_in / price).floor();
        Ok(Quote {
            amount_in,
            min_amount_out: (out * (Decimal::ONE_HUNDRED - slippage_pct) / Decimal::ONE_HUNDRED).floor(),
            base_token_price: price,
            payload: (),
        })
    }

    async fn get_sell_quote(&self, amount_in: Decimal, slippage_pct: Decimal) -> Result<Quote<()>> {
        if Self::take_failure(&self.state.failing_sell_quotes) {
            bail!("sell quote timed out");
        }
        let price = self.price();
        let out = amount_in * price;
        Ok(Quote {
            amount_in,
            min_amount_out: (out * (Decimal::ONE_HUNDRED - slippage_pct) / Decimal::ONE_HUNDRED).floor(),
            base_token_price: price,
            payload: (),
        })
    }

    async fn buy_token(&self, quote: Quote<()>, _options: &SwapOptions) -> Result<SwapSummary> {
        self.state.buy_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.state.failing_buys) {
            bail!("buy transaction dropped");
        }
        let summary = self.settle(SwapDirection::Buy, quote.amount_in, quote.min_amount_out)?;
        if let Some(price) = self.state.price_after_buy.lock().unwrap().take() {
            *self.state.raw_price.lock().unwrap() = price;
        }
        Ok(summary)
    }

    async fn sell_token(&self, quote: Quote<()>, _options: &SwapOptions) -> Result<SwapSummary> {
        self.state.sell_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.state.failing_sells) {
            bail!("sell transaction dropped");
        }
        self.settle(SwapDirection::Sell, quote.amount_in, quote.min_amount_out)
    }

    async fn get_price_in_quote(&self) -> Result<Decimal> {
        self.state.price_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.state.failing_prices) {
            bail!("price feed unavailable");
        }
        // 6-decimal base against 9-decimal WSOL
        Ok(self.price() / dec!(1000))
    }

    async fn get_pool_quote_reserve(&self) -> Result<Decimal> {
        if self.state.panic_on_sizing.load(Ordering::SeqCst) {
            panic!("pool state decoding failed");
        }
        Ok(dec!(1000000000000))
    }
}

/// Hands the same shared market to every pool.
pub struct MockSwapperFactory {
    pub swapper: MockSwapper,
}

impl TokenSwapperFactory for MockSwapperFactory {
    type Swapper = MockSwapper;

    fn create_swapper(&self, _pool: &PoolCreation) -> Result<MockSwapper> {
        Ok(self.swapper.clone())
    }
}

/// Resolves after `delay` with a fixed verdict.
pub struct StaticCriteria {
    pub verdict: Result<(), TaskError>,
    pub delay: Duration,
}

impl StaticCriteria {
    pub fn pass() -> Self {
        Self { verdict: Ok(()), delay: Duration::ZERO }
    }

    pub fn fail(error: TaskError) -> Self {
        Self { verdict: Err(error), delay: Duration::ZERO }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl SnipingCriteria for StaticCriteria {
    async fn wait_until_satisfied(&self, _pool: &PoolCreation) -> Result<(), TaskError> {
        tokio::time::sleep(self.delay).await;
        self.verdict.clone()
    }
}

/// Always predicts the same slots.
pub struct FixedLeaderSchedule {
    pub next: NextLeaderSlot,
    pub tip_accounts: Arc<Vec<Pubkey>>,
}

impl FixedLeaderSchedule {
    pub fn new(current_slot: u64, next_slot: u64) -> Self {
        Self {
            next: NextLeaderSlot { current_slot, next_slot },
            tip_accounts: Arc::new(vec![Pubkey::new_unique()]),
        }
    }
}

#[async_trait]
impl LeaderSchedule for FixedLeaderSchedule {
    async fn next_leader_slot(&self) -> Result<NextLeaderSlot, LeaderScheduleError> {
        Ok(self.next)
    }

    fn tip_accounts(&self) -> Arc<Vec<Pubkey>> {
        self.tip_accounts.clone()
    }
}

/// Opens or closes the leader window per call following a script.
/// The last entry repeats once the script is exhausted.
pub struct ScriptedLeaderSchedule {
    windows: Vec<bool>,
    calls: AtomicUsize,
    tip_accounts: Arc<Vec<Pubkey>>,
}

impl ScriptedLeaderSchedule {
    pub fn new(windows: Vec<bool>) -> Self {
        Self {
            windows,
            calls: AtomicUsize::new(0),
            tip_accounts: Arc::new(vec![Pubkey::new_unique()]),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LeaderSchedule for ScriptedLeaderSchedule {
    async fn next_leader_slot(&self) -> Result<NextLeaderSlot, LeaderScheduleError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let open = self
            .windows
            .get(call)
            .or(self.windows.last())
            .copied()
            .unwrap_or(true);
        Ok(NextLeaderSlot {
            current_slot: 100,
            next_slot: if open { 100 } else { 101 },
        })
    }

    fn tip_accounts(&self) -> Arc<Vec<Pubkey>> {
        self.tip_accounts.clone()
    }
}
