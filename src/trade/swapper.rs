//! Token swapper seam consumed by sniping tasks.
//!
//! Swappers quote and execute swaps against a single pool and report the
//! settlement facts; the orchestration layer never looks inside a quote payload.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use tracing::info;

use crate::types::PoolCreation;

/// Direction of a swap, seen from the base token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
    Buy,
    Sell,
}

impl fmt::Display for SwapDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapDirection::Buy => write!(f, "BUY"),
            SwapDirection::Sell => write!(f, "SELL"),
        }
    }
}

/// A priced swap proposal. `payload` is produced and consumed by the same swapper.
#[derive(Debug, Clone)]
pub struct Quote<P> {
    /// Raw amount of the input token
    pub amount_in: Decimal,
    /// Raw amount of the output token accepted at worst
    pub min_amount_out: Decimal,
    /// Pool price of one base token in quote tokens
    pub base_token_price: Decimal,
    pub payload: P,
}

impl<P> Quote<P> {
    /// Worst-case output per unit of input, `None` for an empty quote.
    pub fn average_price(&self) -> Option<Decimal> {
        self.min_amount_out.checked_div(self.amount_in)
    }
}

/// Settlement facts of a landed swap, balances are those of the paying account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapSummary {
    pub signature: String,
    pub direction: SwapDirection,
    pub pre_base_amount: Decimal,
    pub post_base_amount: Decimal,
    pub pre_quote_amount: Decimal,
    pub post_quote_amount: Decimal,
    /// Unix timestamp (seconds) of the block containing the swap
    pub block_timestamp: i64,
}

impl SwapSummary {
    pub fn base_delta(&self) -> Decimal {
        (self.pre_base_amount - self.post_base_amount).abs()
    }

    pub fn quote_delta(&self) -> Decimal {
        (self.pre_quote_amount - self.post_quote_amount).abs()
    }

    /// Realized price `|Δquote| / |Δbase|`, `None` if no base token moved.
    pub fn execution_price(&self) -> Option<Decimal> {
        self.quote_delta().checked_div(self.base_delta())
    }

    pub fn log(&self) {
        info!(
            "Swap {} {}: base {} -> {}, quote {} -> {}, block time {}",
            self.direction,
            self.signature,
            self.pre_base_amount,
            self.post_base_amount,
            self.pre_quote_amount,
            self.post_quote_amount,
            self.block_timestamp
        );
    }
}

/// Submission options for a swap transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwapOptions {
    pub skip_preflight: bool,
    pub priority_fee_micro_lamports: u64,
    pub max_retries: Option<u32>,
    /// Jito tip receiver, set when submissions are gated on Jito leaders
    pub tip_account: Option<Pubkey>,
}

/// Quotes and executes swaps on one pool.
#[async_trait]
pub trait TokenSwapper: Send + Sync + 'static {
    /// Protocol-specific data carried from a quote to its execution.
    type Payload: Send + Sync + 'static;

    async fn get_buy_quote(
        &self,
        amount_in: Decimal,
        slippage_pct: Decimal,
    ) -> Result<Quote<Self::Payload>>;

    async fn get_sell_quote(
        &self,
        amount_in: Decimal,
        slippage_pct: Decimal,
    ) -> Result<Quote<Self::Payload>>;

    async fn buy_token(
        &self,
        quote: Quote<Self::Payload>,
        options: &SwapOptions,
    ) -> Result<SwapSummary>;

    async fn sell_token(
        &self,
        quote: Quote<Self::Payload>,
        options: &SwapOptions,
    ) -> Result<SwapSummary>;

    /// Current pool price of one base token in quote tokens (UI units).
    async fn get_price_in_quote(&self) -> Result<Decimal>;

    /// Raw amount of quote token currently pooled.
    async fn get_pool_quote_reserve(&self) -> Result<Decimal>;
}

/// Builds the swapper for a newly dispatched pool.
pub trait TokenSwapperFactory: Send + Sync + 'static {
    type Swapper: TokenSwapper;

    fn create_swapper(&self, pool: &PoolCreation) -> Result<Self::Swapper>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn summary(pre_base: Decimal, post_base: Decimal, pre_quote: Decimal, post_quote: Decimal) -> SwapSummary {
        SwapSummary {
            signature: "sig".to_string(),
            direction: SwapDirection::Buy,
            pre_base_amount: pre_base,
            post_base_amount: post_base,
            pre_quote_amount: pre_quote,
            post_quote_amount: post_quote,
            block_timestamp: 0,
        }
    }

    #[test]
    fn test_execution_price_from_balance_deltas() {
        let buy = summary(dec!(0), dec!(400), dec!(1000), dec!(800));
        assert_eq!(buy.execution_price(), Some(dec!(0.5)));

        let sell = summary(dec!(400), dec!(100), dec!(800), dec!(1100));
        assert_eq!(sell.execution_price(), Some(dec!(1)));
    }

    #[test]
    fn test_execution_price_without_base_movement() {
        let noop = summary(dec!(5), dec!(5), dec!(10), dec!(9));
        assert_eq!(noop.execution_price(), None);
    }

    #[test]
    fn test_quote_average_price() {
        let quote = Quote {
            amount_in: dec!(200),
            min_amount_out: dec!(50),
            base_token_price: dec!(0.3),
            payload: (),
        };
        assert_eq!(quote.average_price(), Some(dec!(0.25)));
    }
}
