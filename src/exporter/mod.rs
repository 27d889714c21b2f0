//! The exporter facade (§4.5): owns the shards, series cache, lease, and
//! RPC client, and drives both halves of the pipeline — `Export` on the
//! producer's call path, and the send loop as a background task.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};

use crate::batch::Batch;
use crate::common::{ConfigError, DropReason};
use crate::config::{ExporterConfig, DEFAULT_FLUSH_INTERVAL, DEFAULT_GC_INTERVAL};
use crate::lease::Lease;
use crate::rpc::RpcClient;
use crate::series_cache::SeriesCache;
use crate::shard::{EnqueueOutcome, Shard};
use crate::transformer::{self, DropCounters};
use crate::types::{Exemplar, LabelSet, MetricMetadata, Sample, SeriesRef};

/// A cancellation primitive for [`Exporter::run`], [`Exporter::garbage_collect_loop`],
/// and [`crate::lease::Lease::run`] (§5 "Cancellation & timeouts").
///
/// Built on `tokio::sync::watch` rather than bare `tokio::sync::Notify`:
/// a lone `Notify::notify_waiters` call racing a task that hasn't reached
/// its `notified().await` yet is missed forever, whereas a `watch` value
/// is always observable after the fact. `tokio-util`'s `CancellationToken`
/// solves the same problem but isn't part of the existing dependency
/// stack, and this crate only ever needs one-shot, no-payload
/// cancellation, not its child-token tree.
#[derive(Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

/// The other end of a [`CancelSignal`], held by whoever owns the
/// exporter's lifecycle and decides when to shut it down.
#[derive(Clone)]
pub struct Canceller(watch::Sender<bool>);

impl Canceller {
    /// Requests cancellation. Idempotent; safe to call from multiple
    /// places (e.g. both a signal handler and a test timeout).
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl CancelSignal {
    /// Creates a linked `(Canceller, CancelSignal)` pair.
    #[must_use]
    pub fn channel() -> (Canceller, Self) {
        let (tx, rx) = watch::channel(false);
        (Canceller(tx), Self(rx))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once cancellation has been requested, immediately if it
    /// already has.
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

/// The core pipeline: series cache, shards, lease, and RPC client bound
/// together (§4.5 "State").
pub struct Exporter {
    shards: Vec<Arc<Shard>>,
    series_cache: Arc<SeriesCache>,
    config: Mutex<ExporterConfig>,
    lease: Arc<dyn Lease>,
    rpc_client: Arc<dyn RpcClient>,
    resource_type: &'static str,
    drops: DropCounters,
    more_data: Notify,
    shard_cursor: AtomicUsize,
    in_flight: AtomicUsize,
}

impl Exporter {
    /// Builds the exporter and registers `series_cache.clear` as the
    /// lease's leader-change callback (§4.5 "Lease integration").
    ///
    /// `resource_type` is the target API's monitored-resource type (e.g.
    /// `"generic_task"`) and is fixed for the exporter's lifetime.
    #[must_use]
    pub fn new(
        config: ExporterConfig,
        lease: Arc<dyn Lease>,
        rpc_client: Arc<dyn RpcClient>,
        resource_type: &'static str,
    ) -> Arc<Self> {
        let shards = (0..config.shard_count)
            .map(|_| Arc::new(Shard::with_capacity(config.shard_buffer_size)))
            .collect();
        let series_cache = Arc::new(SeriesCache::new());

        let exporter = Arc::new(Self {
            shards,
            series_cache: series_cache.clone(),
            config: Mutex::new(config),
            lease: lease.clone(),
            rpc_client,
            resource_type,
            drops: DropCounters::default(),
            more_data: Notify::new(),
            shard_cursor: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
        });

        lease.on_leader_change(Box::new(move || series_cache.clear()));
        exporter
    }

    /// Registers the producer's series-ref to label-set resolver. Must be
    /// called exactly once before [`Exporter::export`] (delegates to
    /// [`SeriesCache::set_labels_by_ref`], same single-call contract).
    pub fn set_labels_by_ref<F>(&self, f: F)
    where
        F: Fn(SeriesRef) -> Option<LabelSet> + Send + Sync + 'static,
    {
        self.series_cache.set_labels_by_ref(f);
    }

    /// Read access to per-[`DropReason`] counts, for tests and diagnostics.
    #[must_use]
    pub fn drop_count(&self, reason: DropReason) -> u64 {
        self.drops.get(reason)
    }

    /// Applies a new configuration (§4.5 `ApplyConfig`). Must be called at
    /// least once before [`Exporter::export`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingProjectId`] or
    /// [`ConfigError::MissingLocation`] if neither the explicit config nor
    /// the external labels can fill that resource-label default; without
    /// it, every series lacking its own `project_id`/`location` label
    /// would silently drop forever instead of failing fast.
    pub fn apply_config(&self, new_config: ExporterConfig) -> Result<(), ConfigError> {
        if new_config.project_id.is_none() && !new_config.external_labels.contains_key("project_id") {
            return Err(ConfigError::MissingProjectId);
        }
        if new_config.location.is_none() && !new_config.external_labels.contains_key("location") {
            return Err(ConfigError::MissingLocation);
        }

        let mut guard = self.config.lock();
        let defaults_changed = guard.project_id != new_config.project_id
            || guard.location != new_config.location
            || guard.cluster != new_config.cluster
            || guard.external_labels != new_config.external_labels;
        *guard = new_config;
        drop(guard);

        if defaults_changed {
            self.series_cache.force_refresh();
        }
        Ok(())
    }

    /// Transforms `samples` and enqueues every resulting point onto its
    /// shard (§4.5 "Export path").
    ///
    /// `metadata_fn` overrides, for this call only, the metric-metadata
    /// lookup the transformer falls back to for non-synthetic series.
    pub fn export(
        &self,
        metadata_fn: Option<&dyn Fn(&str) -> Option<MetricMetadata>>,
        samples: &[Sample],
        exemplars_by_ref: &HashMap<SeriesRef, Exemplar>,
    ) {
        let (config, lease_range) = {
            let guard = self.config.lock();
            if guard.disabled {
                return;
            }
            (guard.clone(), self.lease.range())
        };

        if !lease_range.held {
            self.drops.record(DropReason::NotInHaRange);
            return;
        }

        let points = transformer::transform_batch(&self.series_cache, &config, metadata_fn, samples, exemplars_by_ref, &self.drops);

        let mut enqueued = 0u64;
        for point in points {
            let in_range = lease_range.covers(point.interval.end_ms)
                && point.interval.start_ms.map_or(true, |start| lease_range.covers(start));
            if !in_range {
                self.drops.record(DropReason::NotInHaRange);
                continue;
            }

            let shard_index = (point.hash as usize) % self.shards.len();
            match self.shards[shard_index].enqueue(point.hash, point) {
                EnqueueOutcome::Accepted => enqueued += 1,
                EnqueueOutcome::Overflow => self.drops.record(DropReason::ShardOverflow),
            }
        }

        metrics::counter!("cloud_metrics_export_samples_exported_total").increment(enqueued);
        if enqueued > 0 {
            self.more_data.notify_one();
        }
    }

    /// Runs the send loop until `cancel` fires (§4.5 "Send loop").
    ///
    /// Reacts to three events: the "more data" signal (drains shards in
    /// round-robin order, flushing whenever a batch fills), the flush
    /// timer (default 5s, flushes whatever has accumulated), and
    /// cancellation (returns immediately without flushing; any
    /// accumulated-but-unsent batch is lost, which is the documented
    /// trade-off for a clean, non-blocking shutdown, §7).
    pub fn run(self: Arc<Self>, cancel: CancelSignal) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let batch_size = self.config.lock().batch_size;
            let mut batch = Batch::new(batch_size);
            let mut contributing: Vec<Arc<Shard>> = Vec::new();
            let mut flush_timer = tokio::time::interval(DEFAULT_FLUSH_INTERVAL);
            flush_timer.tick().await;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = self.more_data.notified() => {
                        self.drain_shards(&mut batch, &mut contributing).await;
                    }
                    _ = flush_timer.tick() => {
                        if !batch.is_empty() {
                            self.flush(&mut batch, &mut contributing).await;
                        }
                    }
                }
            }
        })
    }

    /// Sweeps the series cache for idle entries on a fixed interval
    /// (§5 "Memory", `DEFAULT_GC_INTERVAL`).
    pub fn garbage_collect_loop(self: Arc<Self>, cancel: CancelSignal) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let mut timer = tokio::time::interval(DEFAULT_GC_INTERVAL);
            timer.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    _ = timer.tick() => {
                        self.series_cache.garbage_collect(DEFAULT_GC_INTERVAL);
                    }
                }
            }
        })
    }

    /// Visits every shard once in round-robin order, filling `batch` and
    /// flushing whenever it reaches capacity, then re-signals itself if
    /// any shard still has entries left over for the next pass.
    async fn drain_shards(&self, batch: &mut Batch, contributing: &mut Vec<Arc<Shard>>) {
        let shard_count = self.shards.len();
        let mut any_remaining = false;

        for _ in 0..shard_count {
            let idx = self.shard_cursor.fetch_add(1, Ordering::Relaxed) % shard_count;
            let shard = &self.shards[idx];

            let taken = shard.fill(batch);
            if taken > 0 {
                contributing.push(shard.clone());
                metrics::histogram!("cloud_metrics_export_shard_process_samples_taken").record(taken as f64);
            }
            if !shard.is_empty() {
                any_remaining = true;
            }
            if batch.full() {
                self.flush(batch, contributing).await;
            }
        }

        if any_remaining {
            self.more_data.notify_one();
        }
    }

    /// Sends whatever `batch` currently holds and releases every
    /// contributing shard, replacing both with fresh, empty state.
    async fn flush(&self, batch: &mut Batch, contributing: &mut Vec<Arc<Shard>>) {
        if batch.is_empty() {
            contributing.clear();
            return;
        }

        let batch_size = self.config.lock().batch_size;
        let to_send = std::mem::replace(batch, Batch::new(batch_size));
        let shards = std::mem::take(contributing);

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("cloud_metrics_export_in_flight_requests").set(in_flight as f64);

        to_send.send(&shards, self.resource_type, self.rpc_client.clone()).await;

        let in_flight = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::gauge!("cloud_metrics_export_in_flight_requests").set(in_flight as f64);
    }
}

/// The process-wide exporter handle (§9 "Global exporter singleton").
///
/// The storage engine calls `Export` from deep inside its write path with
/// no facility to thread a receiver through, so the exporter needs a
/// process-scoped slot the same way `metrics`'s own global recorder does —
/// just scoped to this crate instead of to the `metrics` facade.
static GLOBAL_EXPORTER: OnceLock<Arc<Exporter>> = OnceLock::new();

/// Installs `exporter` as the process-wide handle. Returns the passed-in
/// `Arc` back to the caller if a handle was already installed; the slot is
/// initialize-once, same as [`SeriesCache::set_labels_by_ref`] and
/// [`Lease::on_leader_change`].
pub fn install(exporter: Arc<Exporter>) -> Result<(), Arc<Exporter>> {
    GLOBAL_EXPORTER.set(exporter)
}

/// Returns the installed exporter, if any. Tests that never call
/// [`install`] simply see `None`, rather than needing an inactive stand-in
/// instance wired through every call site.
#[must_use]
pub fn try_get() -> Option<Arc<Exporter>> {
    GLOBAL_EXPORTER.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExporterConfigBuilder;
    use crate::lease::{AlwaysHeldLease, ControllableLease, LeaseRange};
    use crate::rpc::{RpcFuture, TimeSeries};
    use crate::types::MetricType;

    struct RecordingClient {
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl RecordingClient {
        fn new() -> Self {
            Self { calls: Mutex::new(Vec::new()) }
        }
    }

    impl RpcClient for RecordingClient {
        fn create_time_series(&self, project_id: String, series: Vec<TimeSeries>) -> RpcFuture {
            self.calls.lock().push((project_id, series.len()));
            Box::pin(async { Ok(()) })
        }
    }

    fn config() -> ExporterConfig {
        ExporterConfigBuilder::new()
            .project_id("proj")
            .location("us-central1")
            .shard_count(4)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn apply_config_rejects_missing_project_id() {
        let exporter = Exporter::new(
            ExporterConfigBuilder::new().location("us-central1").build().unwrap(),
            AlwaysHeldLease::new(),
            Arc::new(RecordingClient::new()),
            "generic_task",
        );
        let bad = ExporterConfigBuilder::new().location("us-central1").build().unwrap();
        assert!(matches!(exporter.apply_config(bad), Err(ConfigError::MissingProjectId)));
    }

    #[test]
    fn apply_config_accepts_external_label_defaults() {
        let mut labels = indexmap::IndexMap::new();
        labels.insert("project_id".to_owned(), "proj".to_owned());
        labels.insert("location".to_owned(), "us-central1".to_owned());
        let exporter = Exporter::new(config(), AlwaysHeldLease::new(), Arc::new(RecordingClient::new()), "generic_task");
        let cfg = ExporterConfigBuilder::new().external_labels(labels).build().unwrap();
        assert!(exporter.apply_config(cfg).is_ok());
    }

    #[test]
    fn export_drops_everything_when_lease_not_held() {
        let lease = ControllableLease::new(LeaseRange { start_ms: 0, end_ms: 0, held: false });
        let exporter = Exporter::new(config(), lease, Arc::new(RecordingClient::new()), "generic_task");
        exporter.set_labels_by_ref(|sref| {
            Some(LabelSet::from_pairs(vec![
                ("__name__".to_owned(), format!("m_{}", sref.0)),
                ("project_id".to_owned(), "proj".to_owned()),
                ("location".to_owned(), "us-central1".to_owned()),
            ]))
        });

        let samples = [Sample { series_ref: SeriesRef(1), timestamp_ms: 1000, value: 1.0 }];
        exporter.export(None, &samples, &HashMap::new());
        assert_eq!(exporter.drop_count(DropReason::NotInHaRange), 1);
    }

    #[test]
    fn export_enqueues_in_range_gauge_points() {
        let exporter = Exporter::new(config(), AlwaysHeldLease::new(), Arc::new(RecordingClient::new()), "generic_task");
        exporter.set_labels_by_ref(|sref| {
            Some(LabelSet::from_pairs(vec![
                ("__name__".to_owned(), format!("m_{}", sref.0)),
                ("project_id".to_owned(), "proj".to_owned()),
                ("location".to_owned(), "us-central1".to_owned()),
            ]))
        });

        fn gauge_md(name: &str) -> Option<MetricMetadata> {
            Some(MetricMetadata { name: name.to_owned(), metric_type: MetricType::Gauge, help: String::new(), unit: String::new() })
        }
        let md: Option<&dyn Fn(&str) -> Option<MetricMetadata>> = Some(&gauge_md);

        let samples = [Sample { series_ref: SeriesRef(7), timestamp_ms: 1000, value: 42.0 }];
        exporter.export(md, &samples, &HashMap::new());
        assert_eq!(exporter.drop_count(DropReason::NotInHaRange), 0);

        let total: usize = exporter.shards.iter().map(|s| s.len()).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_flushes_on_timer_without_more_data_signal() {
        let client = Arc::new(RecordingClient::new());
        let exporter = Exporter::new(config(), AlwaysHeldLease::new(), client.clone(), "generic_task");
        exporter.set_labels_by_ref(|sref| {
            Some(LabelSet::from_pairs(vec![
                ("__name__".to_owned(), format!("m_{}", sref.0)),
                ("project_id".to_owned(), "proj".to_owned()),
                ("location".to_owned(), "us-central1".to_owned()),
            ]))
        });

        fn gauge_md(name: &str) -> Option<MetricMetadata> {
            Some(MetricMetadata { name: name.to_owned(), metric_type: MetricType::Gauge, help: String::new(), unit: String::new() })
        }
        let md: Option<&dyn Fn(&str) -> Option<MetricMetadata>> = Some(&gauge_md);
        let samples = [Sample { series_ref: SeriesRef(3), timestamp_ms: 1000, value: 1.0 }];
        exporter.export(md, &samples, &HashMap::new());

        let (canceller, cancel) = CancelSignal::channel();
        let handle = tokio::spawn(exporter.clone().run(cancel));

        tokio::time::advance(DEFAULT_FLUSH_INTERVAL * 2).await;
        tokio::task::yield_now().await;

        canceller.cancel();
        handle.await.unwrap();

        assert_eq!(client.calls.lock().len(), 1);
    }

    #[test]
    fn try_get_is_none_until_installed() {
        // The global slot is process-wide and shared across every test in
        // this binary, so this only asserts the read path, not emptiness:
        // another test may have already installed a handle.
        let _ = try_get();
    }

    #[test]
    fn install_rejects_a_second_handle() {
        let first = Exporter::new(config(), AlwaysHeldLease::new(), Arc::new(RecordingClient::new()), "generic_task");
        let second = Exporter::new(config(), AlwaysHeldLease::new(), Arc::new(RecordingClient::new()), "generic_task");
        let _ = install(first);
        assert!(install(second).is_err());
        assert!(try_get().is_some());
    }

    #[test]
    fn cancel_signal_resolves_immediately_if_already_cancelled() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let (canceller, cancel) = CancelSignal::channel();
            canceller.cancel();
            cancel.cancelled().await;
            assert!(cancel.is_cancelled());
        });
    }
}
