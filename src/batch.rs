//! The batch (§4.4): per-destination-project accumulation, the fullness
//! predicate that bounds any single project's list at `batchSize`, and the
//! fan-out send that dispatches one RPC per project and then releases
//! every contributing shard.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{error, warn};

use crate::config::RPC_DEADLINE;
use crate::rpc::{to_wire, RpcClient};
use crate::shard::Shard;
use crate::types::TargetPoint;

/// Accumulates points grouped by destination project id, extracted from
/// each point's resource labels (§3 `Batch`).
pub struct Batch {
    projects: IndexMap<String, Vec<TargetPoint>>,
    batch_size: usize,
    one_project_full: bool,
}

impl Batch {
    /// Creates an empty batch with the given per-project ceiling
    /// (`batchSize`, §6, capped at [`crate::config::MAX_BATCH_SIZE`]).
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self { projects: IndexMap::new(), batch_size, one_project_full: false }
    }

    /// Appends `point` to its project's list (§4.4 `add`). Sets
    /// `one_project_full` once any project's list reaches `batch_size`.
    pub fn add(&mut self, point: TargetPoint) {
        let project_id = point.resource.project_id.clone();
        let list = self.projects.entry(project_id).or_default();
        list.push(point);
        if list.len() >= self.batch_size {
            self.one_project_full = true;
        }
    }

    /// Whether the batch should stop accepting new points: true once any
    /// single project's list has reached capacity (§4.4 `full`). Chosen so
    /// a batch never exceeds the remote's per-request limit for a single
    /// project, while still packing other projects' samples in freely.
    #[must_use]
    pub fn full(&self) -> bool {
        self.one_project_full
    }

    /// No points accumulated yet (§4.4 `empty`).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.values().all(Vec::is_empty)
    }

    /// Total point count across every project (§4.4 `total`).
    #[must_use]
    pub fn total(&self) -> usize {
        self.projects.values().map(Vec::len).sum()
    }

    /// Number of distinct destination projects in this batch (used for the
    /// `projects-per-batch` self-telemetry histogram, §4.5).
    #[must_use]
    pub fn project_count(&self) -> usize {
        self.projects.iter().filter(|(_, points)| !points.is_empty()).count()
    }

    /// Fans out one RPC per project, each in its own spawned task under a
    /// 30s deadline, then — regardless of per-project success or failure —
    /// releases every shard that contributed at least one sample to this
    /// batch (§4.4 `send`, §8 "for every batch B with contributing shards
    /// S, after B.send returns, every s in S has pending = false").
    ///
    /// Errors (RPC failure, timeout, or a panicked task) are logged; this
    /// batch is never retried (§7 "RPC failure").
    pub async fn send(self, contributing_shards: &[Arc<Shard>], resource_type: &'static str, rpc_client: Arc<dyn RpcClient>) {
        let project_count = self.project_count();
        let total = self.total();

        let tasks: Vec<_> = self
            .projects
            .into_iter()
            .filter(|(_, points)| !points.is_empty())
            .map(|(project_id, points)| {
                let series = points.iter().map(|p| to_wire(p, resource_type)).collect();
                let project_id_for_log = project_id.clone();
                let rpc_client = rpc_client.clone();
                tokio::spawn(async move {
                    let request = rpc_client.create_time_series(project_id, series);
                    match tokio::time::timeout(RPC_DEADLINE, request).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            error!(project_id = %project_id_for_log, error = %err, "batch: CreateTimeSeries failed, dropping batch");
                        }
                        Err(_elapsed) => {
                            error!(project_id = %project_id_for_log, "batch: CreateTimeSeries exceeded its deadline, dropping batch");
                        }
                    }
                })
            })
            .collect();

        for result in futures_util::future::join_all(tasks).await {
            if let Err(join_err) = result {
                error!(error = %join_err, "batch: per-project send task panicked");
            }
        }

        metrics::histogram!("cloud_metrics_export_projects_per_batch").record(project_count as f64);
        metrics::histogram!("cloud_metrics_export_samples_per_rpc_batch").record(total as f64);

        for shard in contributing_shards {
            shard.notify_done();
        }
        if contributing_shards.is_empty() {
            warn!("batch: send called with zero contributing shards");
        }
    }
}
