//! Pool creation event sources feeding the dispatcher channel.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::monitor::{AccountCreationMonitor, AccountFetcher};
use crate::types::PoolCreation;

/// Producer of newly observed pools. Each distinct pool is sent at most once.
#[async_trait]
pub trait PoolCreationEventSource: Send + Sync {
    async fn start(&self, sink: mpsc::Sender<PoolCreation>) -> Result<()>;

    async fn stop(&self);
}

/// Replays a fixed list of pool creations, spaced by `interval`.
pub struct ReplayEventSource {
    pools: Vec<PoolCreation>,
    interval: Duration,
    stopped: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReplayEventSource {
    pub fn new(pools: Vec<PoolCreation>, interval: Duration) -> Self {
        Self {
            pools,
            interval,
            stopped: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }
}

#[async_trait]
impl PoolCreationEventSource for ReplayEventSource {
    async fn start(&self, sink: mpsc::Sender<PoolCreation>) -> Result<()> {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.is_some() {
            bail!("Replay event source already started");
        }

        let pools = self.pools.clone();
        let interval = self.interval;
        let stopped = self.stopped.clone();
        info!("Replaying {} pool creations every {:?}", pools.len(), interval);
        *handle = Some(tokio::spawn(async move {
            for pool in pools {
                if stopped.load(Ordering::SeqCst) {
                    break;
                }
                debug!("Replaying pool {}", pool.pool_id);
                if sink.send(pool).await.is_err() {
                    break;
                }
                sleep(interval).await;
            }
            info!("Replay event source finished");
        }));
        Ok(())
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Emits announced pools once their AMM account exists on chain.
///
/// Market creations are announced with the pool account they will be paired
/// with; the account monitor reports when that account gets created.
pub struct MonitoredPoolEventSource<F> {
    monitor: Arc<AccountCreationMonitor<F>>,
    sink: Arc<Mutex<Option<mpsc::Sender<PoolCreation>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<F: AccountFetcher> MonitoredPoolEventSource<F> {
    pub fn new(fetcher: Arc<F>, config: &MonitorConfig) -> Self {
        Self {
            monitor: Arc::new(AccountCreationMonitor::from_config(fetcher, config)),
            sink: Arc::new(Mutex::new(None)),
            handle: Mutex::new(None),
        }
    }

    /// Watches the pool account of `pool` until it is created or the watch expires.
    pub fn announce(&self, pool: PoolCreation) {
        let sink = self.sink.clone();
        self.monitor.register_account(
            pool.pool_id,
            move |key, _data| async move {
                let sender = sink.lock().unwrap_or_else(|e| e.into_inner()).clone();
                let Some(sender) = sender else {
                    warn!("Pool {} created before the event source started", key);
                    return;
                };
                let pool = PoolCreation {
                    observed_at: Utc::now(),
                    ..pool
                };
                if sender.send(pool).await.is_err() {
                    warn!("Dispatcher channel closed, dropping pool {}", key);
                }
            },
            |key| async move {
                info!("Pool account {} was never created", key);
            },
        );
    }

    /// Announced pools whose account has not appeared yet.
    pub fn pending_count(&self) -> usize {
        self.monitor.watched_count()
    }
}

#[async_trait]
impl<F: AccountFetcher> PoolCreationEventSource for MonitoredPoolEventSource<F> {
    async fn start(&self, sink: mpsc::Sender<PoolCreation>) -> Result<()> {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.is_some() {
            bail!("Monitored event source already started");
        }
        *self.sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(sink);
        *handle = Some(self.monitor.start());
        Ok(())
    }

    async fn stop(&self) {
        self.monitor.stop();
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Account monitor ended abnormally: {}", e);
            }
        }
        self.sink.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}
