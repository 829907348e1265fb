use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::warn;

/// Creators whose pools are never sniped.
#[async_trait]
pub trait CreatorBlacklist: Send + Sync {
    async fn has(&self, creator: &Pubkey) -> bool;
}

#[derive(Default)]
pub struct InMemoryCreatorBlacklist {
    creators: RwLock<HashSet<Pubkey>>,
}

impl InMemoryCreatorBlacklist {
    pub fn new(creators: impl IntoIterator<Item = Pubkey>) -> Self {
        Self {
            creators: RwLock::new(creators.into_iter().collect()),
        }
    }

    /// Parses base58 creators, skipping invalid entries.
    pub fn from_base58(creators: &[String]) -> Self {
        Self::new(creators.iter().filter_map(|creator| match Pubkey::from_str(creator) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Ignoring invalid blacklisted creator {}: {}", creator, e);
                None
            }
        }))
    }

    pub async fn add(&self, creator: Pubkey) -> bool {
        self.creators.write().await.insert(creator)
    }

    pub async fn remove(&self, creator: &Pubkey) -> bool {
        self.creators.write().await.remove(creator)
    }

    pub async fn len(&self) -> usize {
        self.creators.read().await.len()
    }
}

#[async_trait]
impl CreatorBlacklist for InMemoryCreatorBlacklist {
    async fn has(&self, creator: &Pubkey) -> bool {
        self.creators.read().await.contains(creator)
    }
}
