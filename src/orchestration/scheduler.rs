//! Periodic driver: extend the NAV series, then rebalance when due, for every index.

use crate::config::{Config, IndexDefinition};
use crate::domain::{calendar, IndexId, Timestamp};
use crate::orchestration::rebalance::Rebalancer;
use crate::orchestration::reconstruct::NavReconstructor;
use tracing::{debug, error, info};

/// What the rebalance step of a tick did for one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceStatus {
    Rebalanced,
    /// The latest snapshot is younger than the rebalance interval.
    NotDue,
    Failed,
}

/// Per-index result of one scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRunSummary {
    pub index_id: IndexId,
    pub rebalance: RebalanceStatus,
    /// Daily points written by reconstruction, None if it failed.
    pub days_written: Option<usize>,
}

#[derive(Clone)]
pub struct Scheduler {
    rebalancer: Rebalancer,
    reconstructor: NavReconstructor,
    config: Config,
}

impl Scheduler {
    pub fn new(rebalancer: Rebalancer, reconstructor: NavReconstructor, config: Config) -> Self {
        Self {
            rebalancer,
            reconstructor,
            config,
        }
    }

    /// Run one tick at `now` for every configured index, in order.
    ///
    /// The series is first extended through yesterday under the current latest
    /// snapshot, whose period is still final and so consolidated. Then the
    /// index is rebalanced at `now`'s UTC midnight if its latest snapshot is
    /// `rebalance_interval_days` old. A failure in either step is logged and
    /// does not stop the other step or the other indices.
    pub async fn run_once(&self, now: Timestamp) -> Vec<IndexRunSummary> {
        let as_of = calendar::floor_to_midnight(now);
        let mut summaries = Vec::with_capacity(self.config.indices.len());

        for index in &self.config.indices {
            let days_written = match self
                .reconstructor
                .reconstruct_until(&index.index_id, now)
                .await
            {
                Ok(report) => Some(report.points.len()),
                Err(e) => {
                    error!(index_id = %index.index_id, error = %e, "NAV reconstruction failed");
                    None
                }
            };

            let rebalance = self.rebalance_if_due(index, as_of).await;

            summaries.push(IndexRunSummary {
                index_id: index.index_id.clone(),
                rebalance,
                days_written,
            });
        }

        summaries
    }

    async fn rebalance_if_due(&self, index: &IndexDefinition, as_of: Timestamp) -> RebalanceStatus {
        match self.rebalancer.rebalance_due(&index.index_id, as_of).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(index_id = %index.index_id, "Rebalance not due");
                return RebalanceStatus::NotDue;
            }
            Err(e) => {
                error!(index_id = %index.index_id, error = %e, "Could not read latest snapshot");
                return RebalanceStatus::Failed;
            }
        }

        match self
            .rebalancer
            .compute_weights(index, as_of, self.config.target_count)
            .await
        {
            Ok(outcome) => {
                info!(
                    index_id = %index.index_id,
                    constituents = outcome.snapshot.constituents.len(),
                    upsert = ?outcome.upsert,
                    "Rebalance complete"
                );
                RebalanceStatus::Rebalanced
            }
            Err(e) => {
                error!(index_id = %index.index_id, error = %e, "Rebalance failed");
                RebalanceStatus::Failed
            }
        }
    }
}
