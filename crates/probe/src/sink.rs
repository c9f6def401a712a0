use std::future::Future;

use dialprobe_core::Result;
use dialprobe_core::model::metric::MetricBatch;
use serde::Serialize;

/// Acknowledgment returned by a metrics backend for one batch.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct IngestAck {
    pub accepted: usize,
    pub message: Option<String>,
}

/// Anything that can take a batch of metric points and publish it.
pub trait MetricsSink: Send + Sync {
    fn submit(&self, batch: &MetricBatch) -> impl Future<Output = Result<IngestAck>> + Send;
}

