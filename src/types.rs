//! Core types and data structures for the pool-sniper trading system.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;

/// Mint address of wrapped SOL, the quote token of every supported pool.
pub const WSOL_MINT: Pubkey = solana_sdk::pubkey!("So11111111111111111111111111111111111111112");

/// An SPL token taking part in a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplToken {
    /// The mint address of the token
    pub mint: Pubkey,
    /// Number of decimals of the raw token amount
    pub decimals: u8,
    /// Metadata symbol, if the token has one
    pub symbol: Option<String>,
    /// Metadata name, if the token has one
    pub name: Option<String>,
    /// Whether the mint authority has been revoked
    pub mint_disabled: bool,
    /// Whether the freeze authority has been revoked
    pub freeze_disabled: bool,
}

impl SplToken {
    /// Wrapped SOL descriptor.
    pub fn wsol() -> Self {
        Self {
            mint: WSOL_MINT,
            decimals: 9,
            symbol: Some("WSOL".to_string()),
            name: Some("WSOL".to_string()),
            mint_disabled: true,
            freeze_disabled: true,
        }
    }

    /// Symbol for log lines, falling back to the mint address.
    pub fn label(&self) -> String {
        self.symbol.clone().unwrap_or_else(|| self.mint.to_string())
    }

    /// Converts a UI amount (e.g. `1.5` SOL) into raw integer units.
    ///
    /// Fails when the raw amount does not fit a `Decimal`, which happens for mints
    /// declaring more decimals than `Decimal` can scale.
    pub fn to_raw_amount(&self, ui_amount: Decimal) -> Result<Decimal> {
        (0..self.decimals)
            .try_fold(ui_amount, |acc, _| acc.checked_mul(Decimal::TEN))
            .map(|raw| raw.floor())
            .ok_or_else(|| {
                anyhow!(
                    "{} {} does not fit raw units with {} decimals",
                    ui_amount,
                    self.label(),
                    self.decimals
                )
            })
    }

    /// Converts raw integer units into a UI amount.
    ///
    /// Never fails: digits beyond `Decimal` precision are rounded away.
    pub fn to_ui_amount(&self, raw_amount: Decimal) -> Decimal {
        (0..self.decimals).fold(raw_amount, |acc, _| {
            acc.checked_div(Decimal::TEN).unwrap_or(Decimal::ZERO)
        })
    }
}

/// Exchange program the pool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    RaydiumAmmV4,
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolType::RaydiumAmmV4 => write!(f, "RAYDIUM_AMM_V4"),
        }
    }
}

/// A newly created liquidity pool observed on-chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolCreation {
    pub pool_type: PoolType,
    /// AMM pool account
    pub pool_id: Pubkey,
    /// Order-book market the pool is bound to
    pub market_id: Pubkey,
    pub base_token: SplToken,
    pub quote_token: SplToken,
    /// Unix timestamp (seconds) from which swaps are accepted
    pub open_time: i64,
    /// Creator of the market
    pub creator: Pubkey,
    /// Unix timestamp (seconds) of the market creation transaction
    pub market_created_at: i64,
    /// When the event source observed the pool
    pub observed_at: DateTime<Utc>,
}

impl PoolCreation {
    /// Age of the market in seconds at `now`.
    pub fn market_age_sec(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() - self.market_created_at
    }
}

/// Reserve and supply facts of a freshly opened pool, in raw units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLiquidity {
    /// Current balance of the pool's quote vault
    pub quote_vault_amount: Decimal,
    /// Quote paid out by swaps since the pool opened
    pub swap_quote_out_amount: Decimal,
    /// Quote received by swaps since the pool opened
    pub swap_quote_in_amount: Decimal,
    /// Current balance of the pool's base vault
    pub base_vault_amount: Decimal,
    /// Total supply of the base mint
    pub base_supply: Decimal,
}

impl PoolLiquidity {
    /// Quote liquidity deposited at creation, undoing the swaps seen since.
    pub fn initial_quote_amount(&self) -> Decimal {
        self.quote_vault_amount + self.swap_quote_out_amount - self.swap_quote_in_amount
    }

    /// Share (%) of the base supply sitting in the pool, `None` for an empty mint.
    pub fn pooled_base_percentage(&self) -> Option<Decimal> {
        self.base_vault_amount
            .checked_div(self.base_supply)
            .and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED))
    }
}
