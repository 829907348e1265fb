use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SnipingAnalyticalService, SnipingPerformance};
use crate::task::TaskSummary;

/// Keeps summaries for the lifetime of the process.
#[derive(Default)]
pub struct InMemorySnipingAnalyticalService {
    summaries: RwLock<Vec<TaskSummary>>,
}

impl InMemorySnipingAnalyticalService {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnipingAnalyticalService for InMemorySnipingAnalyticalService {
    async fn record_sniping_task_summary(&self, summary: &TaskSummary) -> Result<()> {
        self.summaries.write().await.push(summary.clone());
        Ok(())
    }

    async fn sniping_task_summaries(&self) -> Result<Vec<TaskSummary>> {
        Ok(self.summaries.read().await.clone())
    }

    async fn sniping_performance(&self) -> Result<SnipingPerformance> {
        Ok(SnipingPerformance::from_summaries(self.summaries.read().await.iter()))
    }
}
