//! AccountCreationMonitor - polls accounts that do not exist yet.
//!
//! Every poll cycle expires old watches, then fetches all remaining keys in a
//! single batch request. Keys that resolve to account data are handed to their
//! creation callback and stop being watched.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;

/// Batch account reader.
#[async_trait]
pub trait AccountFetcher: Send + Sync + 'static {
    /// Account data for each key, `None` where the account does not exist.
    async fn get_multiple_accounts(&self, keys: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>>;
}

#[async_trait]
impl AccountFetcher for RpcClient {
    async fn get_multiple_accounts(&self, keys: &[Pubkey]) -> Result<Vec<Option<Vec<u8>>>> {
        let response = self
            .get_multiple_accounts_with_commitment(keys, CommitmentConfig::processed())
            .await
            .context("Failed to fetch multiple accounts")?;
        Ok(response
            .value
            .into_iter()
            .map(|account| account.map(|account| account.data))
            .collect())
    }
}

type CreationCallback = Box<dyn FnOnce(Pubkey, Vec<u8>) -> BoxFuture<'static, ()> + Send>;
type ExpireCallback = Box<dyn FnOnce(Pubkey) -> BoxFuture<'static, ()> + Send>;

struct Watch {
    registered_at: Instant,
    on_creation: CreationCallback,
    on_expire: ExpireCallback,
}

pub struct AccountCreationMonitor<F> {
    fetcher: Arc<F>,
    watches: Mutex<HashMap<Pubkey, Watch>>,
    poll_interval: Duration,
    expiration: Duration,
    stopped: AtomicBool,
}

impl<F: AccountFetcher> AccountCreationMonitor<F> {
    pub fn new(fetcher: Arc<F>, poll_interval: Duration, expiration: Duration) -> Self {
        Self {
            fetcher,
            watches: Mutex::new(HashMap::new()),
            poll_interval,
            expiration,
            stopped: AtomicBool::new(false),
        }
    }

    pub fn from_config(fetcher: Arc<F>, config: &MonitorConfig) -> Self {
        Self::new(
            fetcher,
            Duration::from_millis(config.account_poll_interval_ms),
            Duration::from_secs(config.account_expiration_sec),
        )
    }

    /// Watch `account` until it is created or the watch expires.
    /// Registering a key again replaces its previous callbacks.
    pub fn register_account<C, CFut, E, EFut>(&self, account: Pubkey, on_creation: C, on_expire: E)
    where
        C: FnOnce(Pubkey, Vec<u8>) -> CFut + Send + 'static,
        CFut: Future<Output = ()> + Send + 'static,
        E: FnOnce(Pubkey) -> EFut + Send + 'static,
        EFut: Future<Output = ()> + Send + 'static,
    {
        let watch = Watch {
            registered_at: Instant::now(),
            on_creation: Box::new(move |key, data| on_creation(key, data).boxed()),
            on_expire: Box::new(move |key| on_expire(key).boxed()),
        };
        if self.watches().insert(account, watch).is_some() {
            warn!("Account {} was already watched, callbacks replaced", account);
        } else {
            debug!("Watching account {}", account);
        }
    }

    pub fn is_watching(&self, account: &Pubkey) -> bool {
        self.watches().contains_key(account)
    }

    pub fn watched_count(&self) -> usize {
        self.watches().len()
    }

    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run())
    }

    /// Polling loop. The stop flag is only checked between cycles.
    pub async fn run(self: Arc<Self>) {
        info!(
            "AccountCreationMonitor is running (poll {:?}, expiration {:?})",
            self.poll_interval, self.expiration
        );
        while !self.stopped.load(Ordering::SeqCst) {
            sleep(self.poll_interval).await;
            self.poll_once().await;
        }
        info!("AccountCreationMonitor stopped with {} watches left", self.watched_count());
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// One cycle: expire, batch fetch, dispatch creations.
    pub async fn poll_once(&self) {
        let (expired, keys) = self.take_expired();
        for (key, watch) in expired {
            info!("Account {} was not created within {:?}", key, self.expiration);
            tokio::spawn((watch.on_expire)(key));
        }
        if keys.is_empty() {
            return;
        }

        let accounts = match self.fetcher.get_multiple_accounts(&keys).await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!("Failed to fetch {} watched accounts: {:#}", keys.len(), e);
                return;
            }
        };
        if accounts.len() != keys.len() {
            warn!("Requested {} accounts, received {}", keys.len(), accounts.len());
        }

        for (key, account) in keys.into_iter().zip(accounts) {
            let Some(data) = account else { continue };
            let watch = self.watches().remove(&key);
            if let Some(watch) = watch {
                info!("Account {} created ({} bytes)", key, data.len());
                tokio::spawn((watch.on_creation)(key, data));
            }
        }
    }

    fn take_expired(&self) -> (Vec<(Pubkey, Watch)>, Vec<Pubkey>) {
        let now = Instant::now();
        let mut watches = self.watches();
        let expired_keys: Vec<Pubkey> = watches
            .iter()
            .filter(|(_, watch)| now.duration_since(watch.registered_at) >= self.expiration)
            .map(|(key, _)| *key)
            .collect();
        let expired = expired_keys
            .into_iter()
            .filter_map(|key| watches.remove(&key).map(|watch| (key, watch)))
            .collect();
        (expired, watches.keys().copied().collect())
    }

    fn watches(&self) -> MutexGuard<'_, HashMap<Pubkey, Watch>> {
        self.watches.lock().unwrap_or_else(|e| e.into_inner())
    }
}
