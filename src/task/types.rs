//! Task states and the terminal summary a task hands to the dispatcher.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use tracing::{error, info};

use crate::task::errors::TaskError;
use crate::types::{PoolCreation, SplToken};

/// Lifecycle of a sniping task. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    AwaitingCriteria,
    BuyingIn,
    Monitoring,
    HardCashingOut,
    Finalized,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::AwaitingCriteria => "AWAITING_CRITERIA",
            TaskState::BuyingIn => "BUYING_IN",
            TaskState::Monitoring => "MONITORING",
            TaskState::HardCashingOut => "HARD_CASHING_OUT",
            TaskState::Finalized => "FINALIZED",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    /// Price of one base token in quote tokens (UI units)
    pub price: Decimal,
}

/// Terminal record of one sniping task, produced exactly once per dispatched pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub pool_id: Pubkey,
    pub market_id: Pubkey,
    pub base_token: SplToken,
    pub quote_token: SplToken,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Raw quote units spent
    pub total_investment: Decimal,
    /// Raw quote units received
    pub total_return: Decimal,
    pub price_samples: Vec<PriceSample>,
    pub txn_signatures: Vec<String>,
    pub buy_in_price: Option<Decimal>,
    pub initial_cash_out_price: Option<Decimal>,
    pub final_cash_out_price: Option<Decimal>,
    pub error: Option<TaskError>,
}

impl TaskSummary {
    /// Summary of a task that failed before touching the ledger.
    pub fn from_error(pool: &PoolCreation, started_at: DateTime<Utc>, error: TaskError) -> Self {
        Self {
            pool_id: pool.pool_id,
            market_id: pool.market_id,
            base_token: pool.base_token.clone(),
            quote_token: pool.quote_token.clone(),
            started_at,
            finished_at: Utc::now(),
            total_investment: Decimal::ZERO,
            total_return: Decimal::ZERO,
            price_samples: Vec::new(),
            txn_signatures: Vec::new(),
            buy_in_price: None,
            initial_cash_out_price: None,
            final_cash_out_price: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn pnl(&self) -> Decimal {
        self.total_return - self.total_investment
    }

    pub fn roi(&self) -> Decimal {
        self.pnl()
            .checked_div(self.total_investment)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn log(&self) {
        let investment = self.quote_token.to_ui_amount(self.total_investment);
        let returned = self.quote_token.to_ui_amount(self.total_return);
        match &self.error {
            None => info!(
                "Task {} ({}) finished: invested {} {}, returned {} {}, ROI {:.2}%, {} samples, txns {:?}",
                self.pool_id,
                self.base_token.label(),
                investment,
                self.quote_token.label(),
                returned,
                self.quote_token.label(),
                self.roi() * Decimal::ONE_HUNDRED,
                self.price_samples.len(),
                self.txn_signatures
            ),
            Some(err) if err.is_criteria_failure() => {
                info!("Task {} ({}) skipped: {}", self.pool_id, self.base_token.label(), err)
            }
            Some(err) => error!(
                "Task {} ({}) failed: {} (invested {}, returned {}, txns {:?})",
                self.pool_id,
                self.base_token.label(),
                err,
                investment,
                returned,
                self.txn_signatures
            ),
        }
    }
}
