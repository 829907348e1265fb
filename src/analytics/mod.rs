//! Analytics module - records finalized task summaries and aggregates performance.

pub mod in_memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::task::TaskSummary;

pub use in_memory::InMemorySnipingAnalyticalService;
pub use sqlite::SqliteSnipingAnalyticalService;

/// Aggregate results over every recorded task. Amounts are raw quote units.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnipingPerformance {
    pub total_investment: Decimal,
    pub total_return: Decimal,
    pub task_count: usize,
    pub failed_count: usize,
}

impl SnipingPerformance {
    pub fn from_summaries<'a>(summaries: impl IntoIterator<Item = &'a TaskSummary>) -> Self {
        summaries
            .into_iter()
            .fold(Self::default(), |mut performance, summary| {
                performance.add(summary.total_investment, summary.total_return, summary.error.is_some());
                performance
            })
    }

    fn add(&mut self, investment: Decimal, returned: Decimal, failed: bool) {
        self.total_investment += investment;
        self.total_return += returned;
        self.task_count += 1;
        if failed {
            self.failed_count += 1;
        }
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
        info!(
            "Sniping performance: {} tasks ({} failed), invested {}, returned {}, PnL {}, ROI {:.2}%",
            self.task_count,
            self.failed_count,
            self.total_investment,
            self.total_return,
            self.pnl(),
            self.roi() * Decimal::ONE_HUNDRED
        );
    }
}

/// Sink for finalized task summaries.
#[async_trait]
pub trait SnipingAnalyticalService: Send + Sync {
    async fn record_sniping_task_summary(&self, summary: &TaskSummary) -> Result<()>;

    /// Recorded summaries in recording order.
    async fn sniping_task_summaries(&self) -> Result<Vec<TaskSummary>>;

    async fn sniping_performance(&self) -> Result<SnipingPerformance>;
}
