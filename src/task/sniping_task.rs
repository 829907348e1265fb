//! SnipingTask - per-pool state machine.
//!
//! `AwaitingCriteria -> BuyingIn -> Monitoring -> HardCashingOut -> Finalized`, with
//! any failure jumping straight to `Finalized`. The task owns its ledger and
//! yields exactly one [`TaskSummary`] from [`SnipingTask::run`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{debug, error, info, instrument, warn};

use crate::config::SniperConfig;
use crate::jito::LeaderSchedule;
use crate::task::criteria::SnipingCriteria;
use crate::task::errors::TaskError;
use crate::task::spammer::{Spammer, SpammerInput};
use crate::task::types::{PriceSample, TaskState, TaskSummary};
use crate::trade::{PositionManager, SwapDirection, SwapOptions, SwapSummary, TokenSwapper};
use crate::types::PoolCreation;

/// Sell attempts per hard cash-out round before the failure is escalated to an error log.
const CASH_OUT_ATTEMPTS_PER_ROUND: usize = 10;

/// Shared collaborators handed to every task by the dispatcher.
#[derive(Clone)]
pub struct TaskContext {
    pub criteria: Arc<dyn SnipingCriteria>,
    pub leader_schedule: Option<Arc<dyn LeaderSchedule>>,
    pub config: Arc<SniperConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitKind {
    TakeProfit,
    StopLoss,
}

pub struct SnipingTask<S: TokenSwapper> {
    pool: PoolCreation,
    swapper: Arc<S>,
    context: TaskContext,
    state: TaskState,
    position: PositionManager,
    price_samples: Vec<PriceSample>,
    txn_signatures: Vec<String>,
    started_at: DateTime<Utc>,
    buy_in_timestamp: Option<i64>,
    buy_in_price: Option<Decimal>,
    initial_cash_out_price: Option<Decimal>,
    final_cash_out_price: Option<Decimal>,
    last_sample_at: Option<Instant>,
}

impl<S: TokenSwapper> SnipingTask<S> {
    pub fn new(pool: PoolCreation, swapper: Arc<S>, context: TaskContext) -> Self {
        Self {
            pool,
            swapper,
            context,
            state: TaskState::AwaitingCriteria,
            position: PositionManager::new(),
            price_samples: Vec::new(),
            txn_signatures: Vec::new(),
            started_at: Utc::now(),
            buy_in_timestamp: None,
            buy_in_price: None,
            initial_cash_out_price: None,
            final_cash_out_price: None,
            last_sample_at: None,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Drives the task to completion.
    #[instrument(skip(self), fields(pool = %self.pool.pool_id))]
    pub async fn run(mut self) -> TaskSummary {
        info!(
            "Sniping task started for {} / {}",
            self.pool.base_token.label(),
            self.pool.quote_token.label()
        );
        let result = self.execute().await;
        self.transition(TaskState::Finalized);
        self.into_summary(result.err())
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        self.context.criteria.wait_until_satisfied(&self.pool).await?;

        self.transition(TaskState::BuyingIn);
        self.buy_in().await?;

        self.transition(TaskState::Monitoring);
        self.monitor().await;

        self.transition(TaskState::HardCashingOut);
        self.hard_cash_out().await;
        Ok(())
    }

    fn transition(&mut self, next: TaskState) {
        info!("Task {}: {} -> {}", self.pool.pool_id, self.state, next);
        self.state = next;
    }

    fn config(&self) -> &SniperConfig {
        &self.context.config
    }

    /// The schedule, when submissions are gated on Jito leaders.
    fn gating_schedule(&self) -> Option<&Arc<dyn LeaderSchedule>> {
        self.context
            .leader_schedule
            .as_ref()
            .filter(|_| self.config().strategy.jito_only)
    }

    fn swap_options(&self, direction: SwapDirection) -> SwapOptions {
        let config = self.config();
        let tip_account = self.gating_schedule().and_then(|schedule| {
            let tips = schedule.tip_accounts();
            tips.choose(&mut rand::thread_rng()).copied()
        });
        SwapOptions {
            skip_preflight: config.spam.enabled,
            priority_fee_micro_lamports: match direction {
                SwapDirection::Buy => config.strategy.buy_fee_micro_lamports,
                SwapDirection::Sell => config.strategy.sell_fee_micro_lamports,
            },
            max_retries: (config.general.send_txn_retries > 0).then_some(config.general.send_txn_retries),
            tip_account,
        }
    }

    fn apply_swap(&mut self, summary: &SwapSummary) {
        summary.log();
        self.txn_signatures.push(summary.signature.clone());
        match summary.direction {
            SwapDirection::Buy => self.position.buy(summary.quote_delta(), summary.base_delta()),
            SwapDirection::Sell => self.position.sell(summary.base_delta(), summary.quote_delta()),
        }
    }

    /// Raw quote amount to buy with: a share of pooled liquidity within configured bounds.
    async fn buy_in_amount(&self) -> Result<Decimal> {
        let strategy = &self.config().strategy;
        let quote_token = &self.pool.quote_token;
        let reserve = self
            .swapper
            .get_pool_quote_reserve()
            .await
            .context("Failed to read pooled quote liquidity")?;
        let scaled = (reserve * strategy.quote_token_buy_in_percentage / Decimal::ONE_HUNDRED).floor();
        let min = quote_token.to_raw_amount(strategy.min_quote_token_in)?;
        let max = quote_token.to_raw_amount(strategy.max_quote_token_in)?;
        debug!("Pooled quote {}, scaled buy-in {}, bounds [{}, {}]", reserve, scaled, min, max);
        Ok(scaled.clamp(min, max))
    }

    async fn buy_in(&mut self) -> Result<(), TaskError> {
        self.wait_for_buy_window().await?;
        let options = self.swap_options(SwapDirection::Buy);

        let summary = if self.config().spam.enabled {
            self.spam_buy(options).await?
        } else {
            let amount = self.buy_in_amount().await?;
            let quote = self
                .swapper
                .get_buy_quote(amount, self.config().strategy.buy_slippage)
                .await
                .context("Failed to get buy quote")?;
            info!(
                "Buying with {} {} at quoted price {}",
                self.pool.quote_token.to_ui_amount(quote.amount_in),
                self.pool.quote_token.label(),
                quote.base_token_price
            );
            let summary = self.swapper.buy_token(quote, &options).await?;
            self.apply_swap(&summary);
            summary
        };

        self.buy_in_price = summary.execution_price();
        self.buy_in_timestamp = Some(summary.block_timestamp);
        info!(
            "Bought {} {} at {:?}, position {}",
            self.pool.base_token.to_ui_amount(summary.base_delta()),
            self.pool.base_token.label(),
            self.buy_in_price,
            self.position.current_position()
        );
        Ok(())
    }

    /// Races fixed-size buys and reconciles every one that landed.
    async fn spam_buy(&mut self, options: SwapOptions) -> Result<SwapSummary, TaskError> {
        let spam = &self.config().spam;
        let amount = self.pool.quote_token.to_raw_amount(spam.buy_in_amount)?;
        let slippage = self.config().strategy.buy_slippage;
        let swapper = self.swapper.clone();

        let (winner, late) = race_swaps(
            format!("buy {}", self.pool.pool_id),
            spam.interval_ms,
            spam.buy_attempts(),
            move |_| {
                let swapper = swapper.clone();
                let options = options.clone();
                async move {
                    let quote = swapper.get_buy_quote(amount, slippage).await?;
                    swapper.buy_token(quote, &options).await
                }
            },
        )
        .await;
        self.reconcile(winner, late)
    }

    /// Applies a race winner then every late success to the ledger.
    fn reconcile(
        &mut self,
        winner: Result<SwapSummary, TaskError>,
        late: Vec<SwapSummary>,
    ) -> Result<SwapSummary, TaskError> {
        if let Ok(summary) = &winner {
            self.apply_swap(summary);
        }
        for summary in &late {
            warn!("Reconciling late {} {}", summary.direction, summary.signature);
            self.apply_swap(summary);
        }
        winner
    }

    fn cash_out_deadline_ms(&self) -> i64 {
        let buy_in_timestamp = self.buy_in_timestamp.unwrap_or_else(|| self.started_at.timestamp());
        let hard_cash_out_sec = self.config().strategy.hard_cash_out_time_sec as i64;
        (buy_in_timestamp + hard_cash_out_sec) * 1000
    }

    async fn monitor(&mut self) {
        let deadline_ms = self.cash_out_deadline_ms();
        let tick = self.config().strategy.tick_interval();
        loop {
            sleep(tick).await;
            if Utc::now().timestamp_millis() >= deadline_ms {
                info!("Hard cash-out deadline reached while monitoring");
                return;
            }
            match self.monitor_tick().await {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => warn!("Monitoring tick failed: {:#}", e),
            }
        }
    }

    /// Returns `true` once the task should leave monitoring.
    async fn monitor_tick(&mut self) -> Result<bool> {
        if self.gating_schedule().is_some() && !self.in_leader_window().await {
            return Ok(false);
        }
        self.sample_price().await?;

        if self.position.current_position() <= Decimal::ZERO {
            info!("No position left to monitor");
            return Ok(true);
        }
        if self.try_exit(ExitKind::TakeProfit).await? {
            return Ok(true);
        }
        self.try_exit(ExitKind::StopLoss).await
    }

    async fn sample_price(&mut self) -> Result<()> {
        let interval = Duration::from_secs(self.config().general.price_sample_interval_sec);
        if let Some(last) = self.last_sample_at {
            if last.elapsed() < interval {
                return Ok(());
            }
        }
        let price = self
            .swapper
            .get_price_in_quote()
            .await
            .context("Failed to get price in quote")?;
        self.last_sample_at = Some(Instant::now());
        self.price_samples.push(PriceSample {
            timestamp: Utc::now(),
            price,
        });
        debug!("Price sample #{}: {}", self.price_samples.len(), price);
        Ok(())
    }

    /// Sells a share of the position when the quoted ROI crosses the threshold.
    async fn try_exit(&mut self, kind: ExitKind) -> Result<bool> {
        let strategy = &self.config().strategy;
        let (threshold, sell_percentage) = match kind {
            ExitKind::TakeProfit => (strategy.take_profit_percentage, strategy.take_profit_sell_percentage),
            ExitKind::StopLoss => (strategy.stop_loss_percentage, strategy.stop_loss_sell_percentage),
        };
        let sell_slippage = strategy.sell_slippage;

        let amount = (self.position.current_position() * sell_percentage / Decimal::ONE_HUNDRED).floor();
        if amount <= Decimal::ZERO {
            return Ok(false);
        }
        let quote = self
            .swapper
            .get_sell_quote(amount, sell_slippage)
            .await
            .context("Failed to get sell quote")?;
        let Some(average_price) = quote.average_price() else {
            return Ok(false);
        };

        let roi_percentage = self.position.unrealized_roi(average_price) * Decimal::ONE_HUNDRED;
        let triggered = match kind {
            ExitKind::TakeProfit => roi_percentage >= threshold,
            ExitKind::StopLoss => roi_percentage <= -threshold,
        };
        if !triggered {
            return Ok(false);
        }

        info!(
            "{:?} triggered at ROI {:.2}% (threshold {}%), selling {}% of the position",
            kind, roi_percentage, threshold, sell_percentage
        );
        let options = self.swap_options(SwapDirection::Sell);
        let summary = self
            .swapper
            .sell_token(quote, &options)
            .await
            .with_context(|| format!("{kind:?} sell failed"))?;
        self.apply_swap(&summary);
        self.initial_cash_out_price = summary.execution_price();
        Ok(true)
    }

    async fn in_leader_window(&self) -> bool {
        let Some(schedule) = self.gating_schedule() else {
            return true;
        };
        match schedule.next_leader_slot().await {
            Ok(next) => next.is_leader_now(),
            Err(e) => {
                debug!("Skipping tick, leader schedule unavailable: {}", e);
                false
            }
        }
    }

    /// Waits for a Jito leader slot, refusing leaders that are too far away.
    async fn wait_for_buy_window(&self) -> Result<(), TaskError> {
        let Some(schedule) = self.gating_schedule() else {
            return Ok(());
        };
        let max_slots = self.config().strategy.max_slots_until_next_jito_leader;
        let tick = self.config().strategy.tick_interval();
        loop {
            let next = schedule
                .next_leader_slot()
                .await
                .map_err(|e| TaskError::runtime(format!("Leader schedule unavailable: {e}")))?;
            if next.slots_until_leader() > max_slots {
                return Err(TaskError::runtime(format!(
                    "Next Jito leader is {} slots away (slot {}), limit {}",
                    next.slots_until_leader(),
                    next.next_slot,
                    max_slots
                )));
            }
            if next.is_leader_now() {
                debug!("In Jito leader slot {}", next.current_slot);
                return Ok(());
            }
            sleep(tick).await;
        }
    }

    /// Waits for a Jito leader slot. Schedule failures never hold back liquidation.
    async fn wait_for_cash_out_window(&self) {
        let Some(schedule) = self.gating_schedule() else {
            return;
        };
        let tick = self.config().strategy.tick_interval();
        loop {
            match schedule.next_leader_slot().await {
                Ok(next) if next.is_leader_now() => return,
                Ok(_) => sleep(tick).await,
                Err(e) => {
                    warn!("Cashing out without leader timing: {}", e);
                    return;
                }
            }
        }
    }

    async fn hard_cash_out(&mut self) {
        if self.position.current_position() <= Decimal::ZERO {
            info!("Position already closed, nothing to cash out");
            return;
        }
        let remaining_ms = self.cash_out_deadline_ms() - Utc::now().timestamp_millis();
        if remaining_ms > 0 {
            debug!("Sleeping {}ms until hard cash-out", remaining_ms);
            sleep(Duration::from_millis(remaining_ms as u64)).await;
        }
        self.wait_for_cash_out_window().await;

        let summary = if self.config().spam.enabled {
            self.spam_sell_all().await
        } else {
            self.retry_sell_all().await
        };
        self.final_cash_out_price = summary.execution_price();
        info!(
            "Hard cash-out complete at {:?}, position {}",
            self.final_cash_out_price,
            self.position.current_position()
        );
    }

    async fn sell_all(&self) -> Result<SwapSummary> {
        let amount = self.position.current_position();
        let quote = self
            .swapper
            .get_sell_quote(amount, self.config().strategy.sell_slippage)
            .await
            .context("Failed to get sell-all quote")?;
        let options = self.swap_options(SwapDirection::Sell);
        self.swapper
            .sell_token(quote, &options)
            .await
            .context("Sell-all transaction failed")
    }

    async fn retry_sell_all(&mut self) -> SwapSummary {
        let tick = self.config().strategy.tick_interval();
        loop {
            let strategy = FixedInterval::new(tick).take(CASH_OUT_ATTEMPTS_PER_ROUND);
            let this = &*self;
            let result = Retry::start(strategy, || this.sell_all()).await;
            match result {
                Ok(summary) => {
                    self.apply_swap(&summary);
                    return summary;
                }
                Err(e) => error!(
                    "Hard cash-out still failing after {} attempts: {:#}",
                    CASH_OUT_ATTEMPTS_PER_ROUND, e
                ),
            }
        }
    }

    async fn spam_sell_all(&mut self) -> SwapSummary {
        let tick = self.config().strategy.tick_interval();
        loop {
            let amount = self.position.current_position();
            let slippage = self.config().strategy.sell_slippage;
            let options = self.swap_options(SwapDirection::Sell);
            let swapper = self.swapper.clone();
            let spam = &self.config().spam;

            let (winner, late) = race_swaps(
                format!("sell-all {}", self.pool.pool_id),
                spam.interval_ms,
                spam.num_cash_out_txns.max(1),
                move |_| {
                    let swapper = swapper.clone();
                    let options = options.clone();
                    async move {
                        let quote = swapper.get_sell_quote(amount, slippage).await?;
                        swapper.sell_token(quote, &options).await
                    }
                },
            )
            .await;

            match self.reconcile(winner, late) {
                Ok(summary) => return summary,
                Err(e) => {
                    error!("Hard cash-out race failed, retrying: {}", e);
                    sleep(tick).await;
                }
            }
        }
    }

    fn into_summary(self, error: Option<TaskError>) -> TaskSummary {
        TaskSummary {
            pool_id: self.pool.pool_id,
            market_id: self.pool.market_id,
            base_token: self.pool.base_token,
            quote_token: self.pool.quote_token,
            started_at: self.started_at,
            finished_at: Utc::now(),
            total_investment: self.position.total_investment(),
            total_return: self.position.total_return(),
            price_samples: self.price_samples,
            txn_signatures: self.txn_signatures,
            buy_in_price: self.buy_in_price,
            initial_cash_out_price: self.initial_cash_out_price,
            final_cash_out_price: self.final_cash_out_price,
            error,
        }
    }
}

/// Races swap attempts, then drains the race so late successes can be reconciled.
async fn race_swaps<F, Fut>(
    identifier: String,
    interval_ms: u64,
    spam_count: usize,
    spam_fn: F,
) -> (Result<SwapSummary, TaskError>, Vec<SwapSummary>)
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<SwapSummary>> + Send + 'static,
{
    let spammer = Spammer::new();
    let winner = spammer
        .start_spamming(SpammerInput {
            identifier,
            interval_ms,
            spam_count,
            spam_fn,
        })
        .await;
    spammer.wait_for_pending_tasks().await;
    (winner, spammer.take_late_results())
}
