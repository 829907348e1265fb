//! Dry-run execution: real quotes, simulated settlement.
//!
//! `DryRunSwapper` asks the wrapped swapper for quotes and prices, then settles
//! buys and sells against an in-process wallet at the quoted minimum output.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use solana_sdk::signature::Signature;
use std::sync::Mutex;
use tracing::debug;

use crate::trade::swapper::{
    Quote, SwapDirection, SwapOptions, SwapSummary, TokenSwapper, TokenSwapperFactory,
};
use crate::types::PoolCreation;

/// Raw balances of the simulated paying account.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulatedWallet {
    pub base_amount: Decimal,
    pub quote_amount: Decimal,
}

pub struct DryRunSwapper<S> {
    inner: S,
    wallet: Mutex<SimulatedWallet>,
}

impl<S: TokenSwapper> DryRunSwapper<S> {
    pub fn new(inner: S, initial_quote_amount: Decimal) -> Self {
        Self {
            inner,
            wallet: Mutex::new(SimulatedWallet {
                base_amount: Decimal::ZERO,
                quote_amount: initial_quote_amount,
            }),
        }
    }

    pub fn wallet(&self) -> SimulatedWallet {
        *self.wallet.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn settle(&self, direction: SwapDirection, amount_in: Decimal, amount_out: Decimal) -> Result<SwapSummary> {
        let mut wallet = self.wallet.lock().unwrap_or_else(|e| e.into_inner());
        let before = *wallet;
        match direction {
            SwapDirection::Buy => {
                if wallet.quote_amount < amount_in {
                    bail!(
                        "Simulated wallet holds {} quote, buy needs {}",
                        wallet.quote_amount,
                        amount_in
                    );
                }
                wallet.quote_amount -= amount_in;
                wallet.base_amount += amount_out;
            }
            SwapDirection::Sell => {
                if wallet.base_amount < amount_in {
                    bail!(
                        "Simulated wallet holds {} base, sell needs {}",
                        wallet.base_amount,
                        amount_in
                    );
                }
                wallet.base_amount -= amount_in;
                wallet.quote_amount += amount_out;
            }
        }
        debug!("Dry-run {} settled: {:?} -> {:?}", direction, before, *wallet);

        Ok(SwapSummary {
            signature: Signature::new_unique().to_string(),
            direction,
            pre_base_amount: before.base_amount,
            post_base_amount: wallet.base_amount,
            pre_quote_amount: before.quote_amount,
            post_quote_amount: wallet.quote_amount,
            block_timestamp: Utc::now().timestamp(),
        })
    }
}

#[async_trait]
impl<S: TokenSwapper> TokenSwapper for DryRunSwapper<S> {
    type Payload = S::Payload;

    async fn get_buy_quote(&self, amount_in: Decimal, slippage_pct: Decimal) -> Result<Quote<S::Payload>> {
        self.inner.get_buy_quote(amount_in, slippage_pct).await
    }

    async fn get_sell_quote(&self, amount_in: Decimal, slippage_pct: Decimal) -> Result<Quote<S::Payload>> {
        self.inner.get_sell_quote(amount_in, slippage_pct).await
    }

    async fn buy_token(&self, quote: Quote<S::Payload>, _options: &SwapOptions) -> Result<SwapSummary> {
        self.settle(SwapDirection::Buy, quote.amount_in, quote.min_amount_out)
    }

    async fn sell_token(&self, quote: Quote<S::Payload>, _options: &SwapOptions) -> Result<SwapSummary> {
        self.settle(SwapDirection::Sell, quote.amount_in, quote.min_amount_out)
    }

    async fn get_price_in_quote(&self) -> Result<Decimal> {
        self.inner.get_price_in_quote().await
    }

    async fn get_pool_quote_reserve(&self) -> Result<Decimal> {
        self.inner.get_pool_quote_reserve().await
    }
}

/// Wraps every swapper of an inner factory into a `DryRunSwapper`.
pub struct DryRunSwapperFactory<F> {
    inner: F,
    /// Starting quote balance in UI units
    initial_quote_balance: Decimal,
}

impl<F> DryRunSwapperFactory<F> {
    pub fn new(inner: F, initial_quote_balance: Decimal) -> Self {
        Self {
            inner,
            initial_quote_balance,
        }
    }
}

impl<F: TokenSwapperFactory> TokenSwapperFactory for DryRunSwapperFactory<F> {
    type Swapper = DryRunSwapper<F::Swapper>;

    fn create_swapper(&self, pool: &PoolCreation) -> Result<Self::Swapper> {
        let inner = self.inner.create_swapper(pool)?;
        let initial_quote = pool.quote_token.to_raw_amount(self.initial_quote_balance)?;
        Ok(DryRunSwapper::new(inner, initial_quote))
    }
}
