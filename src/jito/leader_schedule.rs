//! Leader schedule predictions used to time swap submissions.
//!
//! Two interchangeable strategies share the [`LeaderSchedule`] contract:
//! - [`BatchLeaderSchedule`] keeps a sorted snapshot of upcoming Jito leader slots
//!   refreshed on an interval and answers by binary search.
//! - [`RealtimeLeaderSchedule`] keeps the last fetched next-leader prediction and
//!   refuses to answer while its feed is failing.
//!
//! Readers never block a refresh: snapshots are swapped atomically.

use anyhow::{bail, Context, Result};
use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, info, instrument, warn};

use crate::config::JitoConfig;

const TIP_ACCOUNTS_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextLeaderSlot {
    pub current_slot: u64,
    pub next_slot: u64,
}

impl NextLeaderSlot {
    pub fn slots_until_leader(&self) -> u64 {
        self.next_slot.saturating_sub(self.current_slot)
    }

    /// Whether the advantageous window has been reached.
    pub fn is_leader_now(&self) -> bool {
        self.current_slot >= self.next_slot
    }
}

/// A run of consecutive leader slots, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderPeriod {
    pub start_slot: u64,
    pub end_slot: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaderScheduleError {
    #[error("No leader slot at or after slot {current_slot} in the snapshot")]
    NoLeaderSlotFound { current_slot: u64 },

    #[error("Leader prediction is stale after {consecutive_errors} failed refreshes")]
    Stale { consecutive_errors: u32 },

    #[error("Leader schedule has not been fetched yet")]
    NotInitialized,

    #[error("Leader source error: {0}")]
    Source(String),
}

#[async_trait]
pub trait LeaderSchedule: Send + Sync {
    async fn next_leader_slot(&self) -> Result<NextLeaderSlot, LeaderScheduleError>;

    /// Accounts eligible to receive a Jito tip.
    fn tip_accounts(&self) -> Arc<Vec<Pubkey>>;
}

/// Upstream provider of Jito leader information (block engine API).
#[async_trait]
pub trait LeaderSource: Send + Sync + 'static {
    /// Upcoming slots led by Jito-connected validators, in any order.
    async fn connected_leader_slots(&self) -> Result<Vec<u64>>;

    async fn next_scheduled_leader(&self) -> Result<NextLeaderSlot>;

    async fn tip_accounts(&self) -> Result<Vec<Pubkey>>;
}

#[async_trait]
pub trait SlotClock: Send + Sync + 'static {
    async fn current_slot(&self) -> Result<u64>;
}

#[async_trait]
impl SlotClock for RpcClient {
    async fn current_slot(&self) -> Result<u64> {
        self.get_slot_with_commitment(CommitmentConfig::processed())
            .await
            .context("Failed to fetch current slot")
    }
}

/// Index of the first snapshot slot not less than `current_slot`.
fn first_slot_at_or_after(slots: &[u64], current_slot: u64) -> Option<usize> {
    let index = slots.partition_point(|&slot| slot < current_slot);
    (index < slots.len()).then_some(index)
}

pub struct BatchLeaderSchedule<L, C> {
    source: Arc<L>,
    clock: Arc<C>,
    slots: ArcSwap<Vec<u64>>,
    tip_accounts: ArcSwap<Vec<Pubkey>>,
    update_interval: Duration,
    refresh_attempts: usize,
    stopped: AtomicBool,
}

impl<L: LeaderSource, C: SlotClock> BatchLeaderSchedule<L, C> {
    pub fn new(source: Arc<L>, clock: Arc<C>, update_interval: Duration) -> Self {
        Self {
            source,
            clock,
            slots: ArcSwap::from_pointee(Vec::new()),
            tip_accounts: ArcSwap::from_pointee(Vec::new()),
            update_interval,
            refresh_attempts: 3,
            stopped: AtomicBool::new(false),
        }
    }

    /// Fetches the first snapshot, then keeps refreshing it in the background.
    pub async fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        self.refresh().await.context("Initial leader schedule fetch failed")?;

        let schedule = self.clone();
        Ok(tokio::spawn(async move {
            while !schedule.stopped.load(Ordering::SeqCst) {
                sleep(schedule.update_interval).await;
                if schedule.stopped.load(Ordering::SeqCst) {
                    break;
                }
                let strategy = ExponentialBackoff::from_millis(100)
                    .max_delay(Duration::from_secs(5))
                    .take(schedule.refresh_attempts);
                if let Err(e) = Retry::start(strategy, || schedule.refresh()).await {
                    warn!("Leader schedule refresh failed, keeping previous snapshot: {:#}", e);
                }
            }
            info!("Batch leader schedule stopped");
        }))
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let mut slots = self
            .source
            .connected_leader_slots()
            .await
            .context("Failed to fetch connected leader slots")?;
        slots.sort_unstable();
        let tip_accounts = self
            .source
            .tip_accounts()
            .await
            .context("Failed to fetch tip accounts")?;

        debug!(
            "Leader snapshot refreshed: {} slots, first {:?}, last {:?}",
            slots.len(),
            slots.first(),
            slots.last()
        );
        self.slots.store(Arc::new(slots));
        self.tip_accounts.store(Arc::new(tip_accounts));
        Ok(())
    }

    /// Smallest snapshot slot not less than `current_slot`.
    pub fn next_leader_slot_at(&self, current_slot: u64) -> Result<NextLeaderSlot, LeaderScheduleError> {
        let slots = self.slots.load();
        let index = first_slot_at_or_after(&slots, current_slot)
            .ok_or(LeaderScheduleError::NoLeaderSlotFound { current_slot })?;
        Ok(NextLeaderSlot {
            current_slot,
            next_slot: slots[index],
        })
    }

    /// Consecutive run of leader slots starting at the next leader slot.
    pub fn next_leader_period(&self, current_slot: u64) -> Result<LeaderPeriod, LeaderScheduleError> {
        let slots = self.slots.load();
        let start = first_slot_at_or_after(&slots, current_slot)
            .ok_or(LeaderScheduleError::NoLeaderSlotFound { current_slot })?;

        let mut end_slot = slots[start];
        for &slot in &slots[start + 1..] {
            if slot > end_slot + 1 {
                break;
            }
            end_slot = slot;
        }
        Ok(LeaderPeriod {
            start_slot: slots[start],
            end_slot,
        })
    }
}

#[async_trait]
impl<L: LeaderSource, C: SlotClock> LeaderSchedule for BatchLeaderSchedule<L, C> {
    async fn next_leader_slot(&self) -> Result<NextLeaderSlot, LeaderScheduleError> {
        let current_slot = self
            .clock
            .current_slot()
            .await
            .map_err(|e| LeaderScheduleError::Source(format!("{e:#}")))?;
        self.next_leader_slot_at(current_slot)
    }

    fn tip_accounts(&self) -> Arc<Vec<Pubkey>> {
        self.tip_accounts.load_full()
    }
}

pub struct RealtimeLeaderSchedule<L> {
    source: Arc<L>,
    next: ArcSwapOption<NextLeaderSlot>,
    tip_accounts: ArcSwap<Vec<Pubkey>>,
    consecutive_errors: AtomicU32,
    request_interval: Duration,
    stopped: AtomicBool,
}

impl<L: LeaderSource> RealtimeLeaderSchedule<L> {
    pub fn new(source: Arc<L>, request_interval: Duration) -> Self {
        Self {
            source,
            next: ArcSwapOption::empty(),
            tip_accounts: ArcSwap::from_pointee(Vec::new()),
            consecutive_errors: AtomicU32::new(0),
            request_interval,
            stopped: AtomicBool::new(false),
        }
    }

    /// Fetches tip accounts and the first next-leader prediction, then keeps
    /// polling in the background.
    pub async fn start(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        self.refresh_tip_accounts().await?;
        self.refresh().await;
        if self.consecutive_errors.load(Ordering::SeqCst) > 0 {
            bail!("Initial next leader fetch failed");
        }

        let schedule = self.clone();
        Ok(tokio::spawn(async move {
            let mut tips_refreshed_at = Instant::now();
            loop {
                sleep(schedule.request_interval).await;
                if schedule.stopped.load(Ordering::SeqCst) {
                    break;
                }
                schedule.refresh().await;

                if tips_refreshed_at.elapsed() >= TIP_ACCOUNTS_REFRESH_INTERVAL {
                    match schedule.refresh_tip_accounts().await {
                        Ok(()) => tips_refreshed_at = Instant::now(),
                        Err(e) => warn!("{:#}", e),
                    }
                }
            }
            info!("Realtime leader schedule stopped");
        }))
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Fetches the next leader once. Failures only bump the error counter.
    pub async fn refresh(&self) {
        match self.source.next_scheduled_leader().await {
            Ok(next) => {
                self.next.store(Some(Arc::new(next)));
                self.consecutive_errors.store(0, Ordering::SeqCst);
            }
            Err(e) => {
                let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                warn!("Next leader fetch failed ({} in a row): {:#}", errors, e);
            }
        }
    }

    async fn refresh_tip_accounts(&self) -> Result<()> {
        let tip_accounts = self
            .source
            .tip_accounts()
            .await
            .context("Failed to fetch tip accounts")?;
        self.tip_accounts.store(Arc::new(tip_accounts));
        Ok(())
    }
}

#[async_trait]
impl<L: LeaderSource> LeaderSchedule for RealtimeLeaderSchedule<L> {
    async fn next_leader_slot(&self) -> Result<NextLeaderSlot, LeaderScheduleError> {
        let consecutive_errors = self.consecutive_errors.load(Ordering::SeqCst);
        if consecutive_errors > 0 {
            return Err(LeaderScheduleError::Stale { consecutive_errors });
        }
        self.next
            .load_full()
            .map(|next| *next)
            .ok_or(LeaderScheduleError::NotInitialized)
    }

    fn tip_accounts(&self) -> Arc<Vec<Pubkey>> {
        self.tip_accounts.load_full()
    }
}

/// The leader schedule strategy chosen by the `[jito]` configuration.
pub enum JitoLeaderSchedule<L, C> {
    Batch(Arc<BatchLeaderSchedule<L, C>>),
    Realtime(Arc<RealtimeLeaderSchedule<L>>),
}

impl<L: LeaderSource, C: SlotClock> JitoLeaderSchedule<L, C> {
    pub fn from_config(config: &JitoConfig, source: Arc<L>, clock: Arc<C>) -> Self {
        if config.realtime_schedule {
            JitoLeaderSchedule::Realtime(Arc::new(RealtimeLeaderSchedule::new(
                source,
                Duration::from_millis(config.realtime_request_interval_ms),
            )))
        } else {
            JitoLeaderSchedule::Batch(Arc::new(BatchLeaderSchedule::new(
                source,
                clock,
                Duration::from_secs(config.snapshot_update_interval_sec),
            )))
        }
    }

    pub async fn start(&self) -> Result<JoinHandle<()>> {
        match self {
            JitoLeaderSchedule::Batch(schedule) => schedule.start().await,
            JitoLeaderSchedule::Realtime(schedule) => schedule.start().await,
        }
    }

    pub fn stop(&self) {
        match self {
            JitoLeaderSchedule::Batch(schedule) => schedule.stop(),
            JitoLeaderSchedule::Realtime(schedule) => schedule.stop(),
        }
    }

    /// Shared handle for tasks and the dispatcher.
    pub fn schedule(&self) -> Arc<dyn LeaderSchedule> {
        match self {
            JitoLeaderSchedule::Batch(schedule) => schedule.clone(),
            JitoLeaderSchedule::Realtime(schedule) => schedule.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::AtomicU64;

    struct MockSource {
        slots: Vec<u64>,
        next_slot: AtomicU64,
        failing: AtomicBool,
        tip: Pubkey,
    }

    impl MockSource {
        fn new(slots: Vec<u64>) -> Self {
            Self {
                slots,
                next_slot: AtomicU64::new(0),
                failing: AtomicBool::new(false),
                tip: Pubkey::new_unique(),
            }
        }
    }

    #[async_trait]
    impl LeaderSource for MockSource {
        async fn connected_leader_slots(&self) -> Result<Vec<u64>> {
            Ok(self.slots.clone())
        }

        async fn next_scheduled_leader(&self) -> Result<NextLeaderSlot> {
            if self.failing.load(Ordering::SeqCst) {
                bail!("block engine unavailable");
            }
            Ok(NextLeaderSlot {
                current_slot: 100,
                next_slot: self.next_slot.load(Ordering::SeqCst),
            })
        }

        async fn tip_accounts(&self) -> Result<Vec<Pubkey>> {
            Ok(vec![self.tip])
        }
    }

    struct FixedClock(u64);

    #[async_trait]
    impl SlotClock for FixedClock {
        async fn current_slot(&self) -> Result<u64> {
            Ok(self.0)
        }
    }

    async fn batch(slots: Vec<u64>, current: u64) -> BatchLeaderSchedule<MockSource, FixedClock> {
        let schedule = BatchLeaderSchedule::new(
            Arc::new(MockSource::new(slots)),
            Arc::new(FixedClock(current)),
            Duration::from_secs(60),
        );
        schedule.refresh().await.expect("refresh");
        schedule
    }

    #[tokio::test]
    async fn test_batch_binary_search() {
        let schedule = batch(vec![21, 5, 7, 6, 20], 10).await;

        assert_eq!(schedule.next_leader_slot_at(10).unwrap().next_slot, 20);
        assert_eq!(schedule.next_leader_slot_at(21).unwrap().next_slot, 21);
        assert_eq!(schedule.next_leader_slot_at(5).unwrap().next_slot, 5);
        assert_eq!(
            schedule.next_leader_slot_at(22),
            Err(LeaderScheduleError::NoLeaderSlotFound { current_slot: 22 })
        );

        let next = schedule.next_leader_slot().await.unwrap();
        assert_eq!(next, NextLeaderSlot { current_slot: 10, next_slot: 20 });
        assert_eq!(next.slots_until_leader(), 10);
        assert_eq!(schedule.tip_accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_empty_snapshot_has_no_leader() {
        let schedule = batch(Vec::new(), 0).await;
        assert!(matches!(
            schedule.next_leader_slot().await,
            Err(LeaderScheduleError::NoLeaderSlotFound { current_slot: 0 })
        ));
    }

    #[tokio::test]
    async fn test_batch_leader_period() {
        let schedule = batch(vec![5, 6, 7, 20, 21, 22, 23, 40], 0).await;
        assert_eq!(
            schedule.next_leader_period(6).unwrap(),
            LeaderPeriod { start_slot: 6, end_slot: 7 }
        );
        assert_eq!(
            schedule.next_leader_period(8).unwrap(),
            LeaderPeriod { start_slot: 20, end_slot: 23 }
        );
        assert_eq!(
            schedule.next_leader_period(40).unwrap(),
            LeaderPeriod { start_slot: 40, end_slot: 40 }
        );
        assert!(schedule.next_leader_period(41).is_err());
    }

    #[tokio::test]
    async fn test_realtime_staleness() {
        let source = Arc::new(MockSource::new(Vec::new()));
        let schedule = RealtimeLeaderSchedule::new(source.clone(), Duration::from_millis(10));

        assert_eq!(
            schedule.next_leader_slot().await,
            Err(LeaderScheduleError::NotInitialized)
        );

        source.next_slot.store(104, Ordering::SeqCst);
        schedule.refresh().await;
        assert_eq!(schedule.next_leader_slot().await.unwrap().next_slot, 104);

        source.failing.store(true, Ordering::SeqCst);
        schedule.refresh().await;
        schedule.refresh().await;
        assert_eq!(
            schedule.next_leader_slot().await,
            Err(LeaderScheduleError::Stale { consecutive_errors: 2 })
        );

        source.failing.store(false, Ordering::SeqCst);
        schedule.refresh().await;
        assert!(schedule.next_leader_slot().await.is_ok());
    }

    #[tokio::test]
    async fn test_realtime_background_refresh() {
        let source = Arc::new(MockSource::new(Vec::new()));
        source.next_slot.store(7, Ordering::SeqCst);
        let schedule = Arc::new(RealtimeLeaderSchedule::new(source, Duration::from_millis(5)));

        let handle = schedule.start().await.expect("start");
        sleep(Duration::from_millis(50)).await;
        assert_eq!(schedule.next_leader_slot().await.unwrap().next_slot, 7);
        assert_eq!(schedule.tip_accounts().len(), 1);

        schedule.stop();
        handle.await.expect("refresh loop should exit");
    }

    #[tokio::test]
    async fn test_realtime_start_waits_for_first_prediction() {
        let source = Arc::new(MockSource::new(Vec::new()));
        source.next_slot.store(12, Ordering::SeqCst);
        let schedule = Arc::new(RealtimeLeaderSchedule::new(source.clone(), Duration::from_secs(60)));

        let handle = schedule.start().await.expect("start");
        // No background tick has run yet, the prediction comes from start itself
        assert_eq!(schedule.next_leader_slot().await.unwrap().next_slot, 12);
        schedule.stop();
        handle.abort();

        source.failing.store(true, Ordering::SeqCst);
        let failing = Arc::new(RealtimeLeaderSchedule::new(source, Duration::from_secs(60)));
        assert!(failing.start().await.is_err());
    }

    #[tokio::test]
    async fn test_schedule_strategy_follows_config() {
        let mut config = JitoConfig {
            realtime_schedule: true,
            snapshot_update_interval_sec: 30,
            realtime_request_interval_ms: 5,
        };
        let source = Arc::new(MockSource::new(vec![150, 120]));
        source.next_slot.store(104, Ordering::SeqCst);
        let clock = Arc::new(FixedClock(110));

        let realtime = JitoLeaderSchedule::from_config(&config, source.clone(), clock.clone());
        assert!(matches!(realtime, JitoLeaderSchedule::Realtime(_)));
        let handle = realtime.start().await.expect("start realtime");
        assert_eq!(realtime.schedule().next_leader_slot().await.unwrap().next_slot, 104);
        realtime.stop();
        handle.await.expect("realtime loop should exit");

        config.realtime_schedule = false;
        let batch = JitoLeaderSchedule::from_config(&config, source, clock);
        let JitoLeaderSchedule::Batch(inner) = &batch else {
            panic!("expected a batch schedule");
        };
        assert_eq!(inner.update_interval, Duration::from_secs(30));
        let handle = batch.start().await.expect("start batch");
        assert_eq!(
            batch.schedule().next_leader_slot().await.unwrap(),
            NextLeaderSlot { current_slot: 110, next_slot: 120 }
        );
        batch.stop();
        handle.abort();
    }
}
