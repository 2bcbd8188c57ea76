//! HTTP transport for the Exa Websets and Answer APIs.
//!
//! A webset is a server-side search job: it is created once, then polled
//! until its searches finish and its enrichments are filled in. This crate
//! only moves bytes; deciding when to stop polling lives in
//! `newsdigest-core`.

mod answer;
mod client;
mod retry;
mod wire;

use async_trait::async_trait;
use newsdigest_shared::{JobHandle, JobStatus, Result, ResultItem, SearchRequest};

pub use answer::{AnswerRequest, AnswerResponse, Citation};
pub use client::{ExaClient, ExaClientOptions};
pub use retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Poll snapshots
// ---------------------------------------------------------------------------

/// One status observation of a webset.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub status: JobStatus,
    /// Items found so far by the first search.
    pub found: u64,
    /// Search completion percentage reported by the API (0-100).
    pub completion: f64,
}

/// Items currently attached to a webset, with enrichment progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemBatch {
    pub items: Vec<ResultItem>,
    pub enrichments_completed: usize,
    pub enrichments_total: usize,
    /// Enrichment columns defined on the webset.
    pub enrichments_requested: usize,
}

impl ItemBatch {
    /// Fraction of enrichment cells that are complete, or `None` when the
    /// webset has no enrichments at all.
    pub fn enrichment_ratio(&self) -> Option<f64> {
        if self.enrichments_total == 0 {
            return None;
        }
        Some(self.enrichments_completed as f64 / self.enrichments_total as f64)
    }

    /// Whether enrichment has progressed far enough to stop waiting.
    ///
    /// With no cells attached yet this holds only when the webset defines no
    /// enrichments at all.
    pub fn enrichments_settled(&self, threshold: f64) -> bool {
        match self.enrichment_ratio() {
            Some(ratio) => ratio >= threshold,
            None => self.enrichments_requested == 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Monitors
// ---------------------------------------------------------------------------

/// Schedule that re-runs a search against an existing webset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSpec {
    pub webset_id: String,
    pub cron: String,
    pub timezone: String,
    pub query: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorHandle {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Read side of a webset job, as seen by the poller.
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn status(&self, handle: &JobHandle) -> Result<StatusSnapshot>;
    async fn items(&self, handle: &JobHandle) -> Result<ItemBatch>;
}

/// Full webset API: creation plus polling.
#[async_trait]
pub trait WebsetApi: JobSource {
    async fn create(&self, request: &SearchRequest) -> Result<JobHandle>;
    async fn create_monitor(&self, spec: &MonitorSpec) -> Result<MonitorHandle>;
}

/// One-shot question answering with citations.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    async fn answer(&self, request: &AnswerRequest) -> Result<AnswerResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrichment_ratio_without_enrichments_is_none() {
        let batch = ItemBatch::default();
        assert_eq!(batch.enrichment_ratio(), None);
    }

    #[test]
    fn enrichment_ratio_counts_cells() {
        let batch = ItemBatch {
            items: vec![],
            enrichments_completed: 4,
            enrichments_total: 5,
            enrichments_requested: 1,
        };
        assert_eq!(batch.enrichment_ratio(), Some(0.8));
        assert!(batch.enrichments_settled(0.8));
        assert!(!batch.enrichments_settled(0.9));
    }

    #[test]
    fn requested_enrichments_without_cells_are_not_settled() {
        let batch = ItemBatch {
            enrichments_requested: 3,
            ..ItemBatch::default()
        };
        assert!(!batch.enrichments_settled(0.8));
        assert!(ItemBatch::default().enrichments_settled(0.8));
    }
}
