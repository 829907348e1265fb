//! Sniping criteria - eligibility policy evaluated before a task commits capital.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::task::errors::TaskError;
use crate::types::{PoolCreation, PoolLiquidity};

#[async_trait]
pub trait SnipingCriteria: Send + Sync {
    /// Resolves once the pool is eligible, or fails with a criteria error.
    async fn wait_until_satisfied(&self, pool: &PoolCreation) -> Result<(), TaskError>;
}

/// Reads the live reserves of a pool.
#[async_trait]
pub trait PoolLiquidityReader: Send + Sync {
    async fn read_liquidity(&self, pool: &PoolCreation) -> Result<PoolLiquidity>;
}

/// Checks token metadata, pool timing, creator reputation and pooled liquidity.
pub struct BasicSnipingCriteria {
    config: PoolConfig,
    rugpull_creators: HashSet<Pubkey>,
    liquidity_reader: Arc<dyn PoolLiquidityReader>,
}

impl BasicSnipingCriteria {
    pub fn new(config: PoolConfig, liquidity_reader: Arc<dyn PoolLiquidityReader>) -> Self {
        let rugpull_creators = config
            .rugpull_creators
            .iter()
            .filter_map(|creator| match Pubkey::from_str(creator) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("Ignoring invalid rug pull creator {}: {}", creator, e);
                    None
                }
            })
            .collect();
        Self {
            config,
            rugpull_creators,
            liquidity_reader,
        }
    }

    fn check(&self, pool: &PoolCreation) -> Result<(), TaskError> {
        let base = &pool.base_token;
        if self.rugpull_creators.contains(&pool.creator) {
            return Err(TaskError::RugpullDetected {
                creator: pool.creator.to_string(),
            });
        }
        if self.config.require_symbol && base.symbol.as_deref().map_or(true, str::is_empty) {
            return Err(TaskError::CriteriaNotMet(format!("token {} has no symbol", base.mint)));
        }
        if self.config.require_mint_disabled && !base.mint_disabled {
            return Err(TaskError::CriteriaNotMet(format!(
                "mint authority of {} is still enabled",
                base.label()
            )));
        }
        if self.config.require_freeze_disabled && !base.freeze_disabled {
            return Err(TaskError::CriteriaNotMet(format!(
                "freeze authority of {} is still enabled",
                base.label()
            )));
        }

        let now = Utc::now();
        if self.config.require_open && pool.open_time > now.timestamp() {
            return Err(TaskError::CriteriaNotMet(format!(
                "pool {} opens at {}",
                pool.pool_id, pool.open_time
            )));
        }
        if self.config.max_market_age_sec > 0 {
            let age = pool.market_age_sec(now);
            if age > self.config.max_market_age_sec as i64 {
                return Err(TaskError::CriteriaNotMet(format!(
                    "market {} is {}s old, limit {}s",
                    pool.market_id, age, self.config.max_market_age_sec
                )));
            }
        }
        Ok(())
    }

    async fn read_liquidity(&self, pool: &PoolCreation) -> Result<PoolLiquidity> {
        let strategy = ExponentialBackoff::from_millis(10)
            .max_delay(Duration::from_secs(1))
            .take(self.config.liquidity_read_attempts.saturating_sub(1));
        Retry::start(strategy, || self.liquidity_reader.read_liquidity(pool))
            .await
            .with_context(|| format!("Failed to read liquidity of pool {}", pool.pool_id))
    }

    fn check_liquidity(&self, pool: &PoolCreation, liquidity: &PoolLiquidity) -> Result<(), TaskError> {
        let quote = &pool.quote_token;
        let initial_quote = quote.to_ui_amount(liquidity.initial_quote_amount());
        if initial_quote < self.config.min_quote_token_in_pool
            || initial_quote > self.config.max_quote_token_in_pool
        {
            return Err(TaskError::CriteriaNotMet(format!(
                "initial {} liquidity {} outside [{}, {}] (vault {}, swapped out {}, swapped in {})",
                quote.label(),
                initial_quote,
                self.config.min_quote_token_in_pool,
                self.config.max_quote_token_in_pool,
                quote.to_ui_amount(liquidity.quote_vault_amount),
                quote.to_ui_amount(liquidity.swap_quote_out_amount),
                quote.to_ui_amount(liquidity.swap_quote_in_amount)
            )));
        }

        let Some(pooled) = liquidity.pooled_base_percentage() else {
            return Err(TaskError::CriteriaNotMet(format!(
                "base mint {} reports no supply",
                pool.base_token.mint
            )));
        };
        if pooled < self.config.min_pooled_token_percentage {
            return Err(TaskError::CriteriaNotMet(format!(
                "only {:.2}% of {} is pooled, minimum {}%",
                pooled,
                pool.base_token.label(),
                self.config.min_pooled_token_percentage
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SnipingCriteria for BasicSnipingCriteria {
    async fn wait_until_satisfied(&self, pool: &PoolCreation) -> Result<(), TaskError> {
        self.check(pool)?;
        let liquidity = self.read_liquidity(pool).await?;
        self.check_liquidity(pool, &liquidity)?;
        debug!("Pool {} satisfies the basic criteria", pool.pool_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PoolType, SplToken};
    use anyhow::bail;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves fixed reserves, failing the first `failures` reads.
    struct StaticLiquidity {
        liquidity: PoolLiquidity,
        failures: AtomicUsize,
        reads: AtomicUsize,
    }

    impl StaticLiquidity {
        fn new(initial_quote_ui: Decimal, pooled_percentage: Decimal) -> Self {
            Self {
                liquidity: PoolLiquidity {
                    quote_vault_amount: SplToken::wsol().to_raw_amount(initial_quote_ui).unwrap(),
                    swap_quote_out_amount: Decimal::ZERO,
                    swap_quote_in_amount: Decimal::ZERO,
                    base_vault_amount: pooled_percentage * dec!(10000),
                    base_supply: dec!(1000000),
                },
                failures: AtomicUsize::new(0),
                reads: AtomicUsize::new(0),
            }
        }

        fn healthy() -> Self {
            Self::new(dec!(85), dec!(80))
        }
    }

    #[async_trait]
    impl PoolLiquidityReader for StaticLiquidity {
        async fn read_liquidity(&self, _pool: &PoolCreation) -> Result<PoolLiquidity> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                bail!("pool account not found");
            }
            Ok(self.liquidity)
        }
    }

    fn criteria(config: PoolConfig) -> BasicSnipingCriteria {
        BasicSnipingCriteria::new(config, Arc::new(StaticLiquidity::healthy()))
    }

    fn pool() -> PoolCreation {
        let now = Utc::now();
        PoolCreation {
            pool_type: PoolType::RaydiumAmmV4,
            pool_id: Pubkey::new_unique(),
            market_id: Pubkey::new_unique(),
            base_token: SplToken {
                mint: Pubkey::new_unique(),
                decimals: 6,
                symbol: Some("MEME".to_string()),
                name: Some("Meme".to_string()),
                mint_disabled: true,
                freeze_disabled: true,
            },
            quote_token: SplToken::wsol(),
            open_time: now.timestamp() - 1,
            creator: Pubkey::new_unique(),
            market_created_at: now.timestamp() - 30,
            observed_at: now,
        }
    }

    #[tokio::test]
    async fn test_eligible_pool_passes() {
        let criteria = criteria(PoolConfig::default());
        assert!(criteria.wait_until_satisfied(&pool()).await.is_ok());
    }

    #[tokio::test]
    async fn test_token_checks() {
        let criteria = criteria(PoolConfig::default());

        let mut no_symbol = pool();
        no_symbol.base_token.symbol = None;
        assert!(matches!(
            criteria.wait_until_satisfied(&no_symbol).await,
            Err(TaskError::CriteriaNotMet(_))
        ));

        let mut mintable = pool();
        mintable.base_token.mint_disabled = false;
        assert!(criteria.wait_until_satisfied(&mintable).await.is_err());

        let mut not_open = pool();
        not_open.open_time = Utc::now().timestamp() + 3600;
        assert!(criteria.wait_until_satisfied(&not_open).await.is_err());
    }

    #[tokio::test]
    async fn test_rugpull_creator_and_market_age() {
        let bad = pool();
        let criteria = criteria(PoolConfig {
            max_market_age_sec: 10,
            rugpull_creators: vec![bad.creator.to_string(), "not-a-key".to_string()],
            ..PoolConfig::default()
        });

        assert_eq!(
            criteria.wait_until_satisfied(&bad).await,
            Err(TaskError::RugpullDetected { creator: bad.creator.to_string() })
        );

        // Default fixture market is 30s old.
        let stale = pool();
        assert!(matches!(
            criteria.wait_until_satisfied(&stale).await,
            Err(TaskError::CriteriaNotMet(_))
        ));
    }

    #[tokio::test]
    async fn test_quote_liquidity_out_of_range() {
        let config = PoolConfig {
            min_quote_token_in_pool: dec!(10),
            max_quote_token_in_pool: dec!(500),
            ..PoolConfig::default()
        };

        let thin = BasicSnipingCriteria::new(config.clone(), Arc::new(StaticLiquidity::new(dec!(5), dec!(80))));
        assert!(matches!(
            thin.wait_until_satisfied(&pool()).await,
            Err(TaskError::CriteriaNotMet(reason)) if reason.contains("liquidity")
        ));

        let deep = BasicSnipingCriteria::new(config.clone(), Arc::new(StaticLiquidity::new(dec!(900), dec!(80))));
        assert!(matches!(
            deep.wait_until_satisfied(&pool()).await,
            Err(TaskError::CriteriaNotMet(_))
        ));

        // Swaps since creation are undone: 450 in the vault after 100 was swapped in
        let mut reader = StaticLiquidity::new(dec!(450), dec!(80));
        reader.liquidity.swap_quote_in_amount = SplToken::wsol().to_raw_amount(dec!(100)).unwrap();
        let traded = BasicSnipingCriteria::new(config, Arc::new(reader));
        assert!(traded.wait_until_satisfied(&pool()).await.is_ok());
    }

    #[tokio::test]
    async fn test_low_pooled_token_share_rejected() {
        let config = PoolConfig {
            min_pooled_token_percentage: dec!(60),
            ..PoolConfig::default()
        };
        let criteria = BasicSnipingCriteria::new(config.clone(), Arc::new(StaticLiquidity::new(dec!(85), dec!(40))));
        assert!(matches!(
            criteria.wait_until_satisfied(&pool()).await,
            Err(TaskError::CriteriaNotMet(reason)) if reason.contains("pooled")
        ));

        let mut empty_mint = StaticLiquidity::healthy();
        empty_mint.liquidity.base_supply = Decimal::ZERO;
        let criteria = BasicSnipingCriteria::new(config, Arc::new(empty_mint));
        assert!(criteria.wait_until_satisfied(&pool()).await.is_err());
    }

    #[tokio::test]
    async fn test_liquidity_read_is_retried() {
        let reader = Arc::new(StaticLiquidity::healthy());
        reader.failures.store(2, Ordering::SeqCst);
        let criteria = BasicSnipingCriteria::new(PoolConfig::default(), reader.clone());
        assert!(criteria.wait_until_satisfied(&pool()).await.is_ok());
        assert_eq!(reader.reads.load(Ordering::SeqCst), 3);

        reader.failures.store(5, Ordering::SeqCst);
        assert!(matches!(
            criteria.wait_until_satisfied(&pool()).await,
            Err(TaskError::Runtime(_))
        ));
    }

    #[tokio::test]
    async fn test_static_checks_skip_liquidity_read() {
        let reader = Arc::new(StaticLiquidity::healthy());
        let criteria = BasicSnipingCriteria::new(PoolConfig::default(), reader.clone());
        let mut frozen = pool();
        frozen.base_token.freeze_disabled = false;
        assert!(criteria.wait_until_satisfied(&frozen).await.is_err());
        assert_eq!(reader.reads.load(Ordering::SeqCst), 0);
    }
}
