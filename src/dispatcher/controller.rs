//! Dispatcher - turns pool creation events into sniping tasks.
//!
//! At most one task runs per pool. Tasks are spawned and never awaited by the
//! dispatch path; each one reports back through `on_task_finalized`, which is the
//! only place a pool leaves the active set. `stop` drains that set before returning.

use anyhow::{bail, Context, Result};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::analytics::SnipingAnalyticalService;
use crate::config::SniperConfig;
use crate::dispatcher::creator_blacklist::CreatorBlacklist;
use crate::dispatcher::event_source::PoolCreationEventSource;
use crate::jito::LeaderSchedule;
use crate::task::{SnipingCriteria, SnipingTask, TaskContext, TaskError, TaskSummary};
use crate::trade::TokenSwapperFactory;
use crate::types::PoolCreation;

/// Collaborators the dispatcher is built from.
pub struct DispatcherDeps<F> {
    pub event_source: Arc<dyn PoolCreationEventSource>,
    pub blacklist: Arc<dyn CreatorBlacklist>,
    pub criteria: Arc<dyn SnipingCriteria>,
    pub swapper_factory: F,
    pub analytics: Arc<dyn SnipingAnalyticalService>,
    pub leader_schedule: Option<Arc<dyn LeaderSchedule>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Spawned,
    NotAccepting,
    BlacklistedCreator,
    AlreadyActive,
    OneShotConsumed,
    SwapperUnavailable,
}

pub struct Dispatcher<F> {
    config: Arc<SniperConfig>,
    deps: DispatcherDeps<F>,
    active_tasks: Mutex<HashSet<Pubkey>>,
    accepting: AtomicBool,
    one_shot_taken: AtomicBool,
    shutdown: Notify,
}

impl<F: TokenSwapperFactory> Dispatcher<F> {
    pub fn new(config: Arc<SniperConfig>, deps: DispatcherDeps<F>) -> Result<Arc<Self>> {
        if config.strategy.jito_only && deps.leader_schedule.is_none() {
            bail!("strategy.jito_only requires a leader schedule");
        }
        Ok(Arc::new(Self {
            config,
            deps,
            active_tasks: Mutex::new(HashSet::new()),
            accepting: AtomicBool::new(true),
            one_shot_taken: AtomicBool::new(false),
            shutdown: Notify::new(),
        }))
    }

    /// Consumes pool creations until the source closes or `stop` is called.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let (sink, mut pools) = mpsc::channel(self.config.general.event_channel_capacity.max(1));
        self.deps
            .event_source
            .start(sink)
            .await
            .context("Failed to start pool creation event source")?;
        info!(
            "Dispatcher is running (one-shot: {}, dry run: {})",
            self.config.general.one_shot_mode, self.config.general.dry_run
        );

        loop {
            tokio::select! {
                pool = pools.recv() => match pool {
                    Some(pool) => {
                        self.dispatch(pool).await;
                    }
                    None => {
                        info!("Pool creation channel closed");
                        break;
                    }
                },
                _ = self.shutdown.notified() => {
                    info!("Dispatcher stopped receiving pools");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Filters a pool and spawns its task. Never waits for the task itself.
    #[instrument(skip(self, pool), fields(pool = %pool.pool_id))]
    pub async fn dispatch(self: &Arc<Self>, pool: PoolCreation) -> DispatchOutcome {
        if !self.accepting.load(Ordering::SeqCst) {
            warn!("Dispatcher is stopping, ignoring pool");
            return DispatchOutcome::NotAccepting;
        }
        if self.deps.blacklist.has(&pool.creator).await {
            info!("Creator {} is blacklisted, ignoring pool", pool.creator);
            return DispatchOutcome::BlacklistedCreator;
        }
        if !self.active().insert(pool.pool_id) {
            warn!("A task is already running for this pool");
            return DispatchOutcome::AlreadyActive;
        }
        if self.config.general.one_shot_mode && self.one_shot_taken.swap(true, Ordering::SeqCst) {
            self.active().remove(&pool.pool_id);
            info!("One-shot mode: a task was already dispatched, ignoring pool");
            return DispatchOutcome::OneShotConsumed;
        }

        let swapper = match self.deps.swapper_factory.create_swapper(&pool) {
            Ok(swapper) => swapper,
            Err(e) => {
                error!("Failed to create swapper: {:#}", e);
                self.active().remove(&pool.pool_id);
                if self.config.general.one_shot_mode {
                    self.one_shot_taken.store(false, Ordering::SeqCst);
                }
                return DispatchOutcome::SwapperUnavailable;
            }
        };

        let context = TaskContext {
            criteria: self.deps.criteria.clone(),
            leader_schedule: self.deps.leader_schedule.clone(),
            config: self.config.clone(),
        };
        let task = SnipingTask::new(pool.clone(), Arc::new(swapper), context);
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let started_at = chrono::Utc::now();
            let summary = match tokio::spawn(task.run()).await {
                Ok(summary) => summary,
                Err(e) => TaskSummary::from_error(
                    &pool,
                    started_at,
                    TaskError::runtime(format!("Sniping task aborted: {e}")),
                ),
            };
            dispatcher.on_task_finalized(summary).await;
        });

        info!("Sniping task spawned, {} active", self.active_task_count());
        DispatchOutcome::Spawned
    }

    /// Records a finished task. Failures here are logged, never propagated.
    async fn on_task_finalized(&self, summary: TaskSummary) {
        summary.log();
        if let Err(e) = self.deps.analytics.record_sniping_task_summary(&summary).await {
            error!("Failed to record summary of pool {}: {:#}", summary.pool_id, e);
        }
        self.log_performance().await;

        self.active().remove(&summary.pool_id);
        info!("Task for pool {} finalized, {} active", summary.pool_id, self.active_task_count());
    }

    async fn log_performance(&self) {
        match self.deps.analytics.sniping_performance().await {
            Ok(performance) => performance.log(),
            Err(e) => error!("Failed to compute sniping performance: {:#}", e),
        }
    }

    /// Stops accepting pools and waits until every active task is finalized.
    pub async fn stop(&self) {
        info!("Stopping dispatcher...");
        self.accepting.store(false, Ordering::SeqCst);
        self.deps.event_source.stop().await;
        self.shutdown.notify_one();

        let poll_interval = Duration::from_millis(self.config.general.active_tasks_polling_interval_ms.max(1));
        loop {
            let remaining = self.active_task_count();
            if remaining == 0 {
                break;
            }
            info!("Waiting for {} active sniping tasks to finish", remaining);
            sleep(poll_interval).await;
        }

        self.log_performance().await;
        info!("Dispatcher stopped");
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    pub fn active_task_count(&self) -> usize {
        self.active().len()
    }

    pub fn is_active(&self, pool_id: &Pubkey) -> bool {
        self.active().contains(pool_id)
    }

    fn active(&self) -> MutexGuard<'_, HashSet<Pubkey>> {
        self.active_tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}
