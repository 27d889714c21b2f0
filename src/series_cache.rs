//! The series cache (§4.1): resolves opaque [`SeriesRef`]s into enriched
//! [`CacheEntry`] descriptors, tracks cumulative-counter reset baselines,
//! and garbage-collects idle entries.
//!
//! The map is guarded by a single `parking_lot::Mutex`, matching the
//! teacher's general preference for `parking_lot` over `std::sync` locks
//! (`recorder.rs`'s `Inner::distributions`/`descriptions`); §5 calls for a
//! single mutex held only across the baseline update in
//! `get_reset_adjusted`, which a single `Mutex<HashMap<..>>` gives for free
//! (a split `RwLock` would need a second lock acquisition to upgrade).

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;
use quanta::{Clock, Instant};
use tracing::{debug, warn};

use crate::common::{DropReason, Matcher};
use crate::config::ExporterConfig;
use crate::formatting::{synthesize_metric_type, KindSuffix};
use crate::hash::rapidhash_label_set;
use crate::types::{
    LabelSet, MetricKind, MetricMetadata, MetricNameSuffix, MetricType, ResourceLabels, SeriesRef,
};

/// Injected callback resolving a [`SeriesRef`] to its label set (§6
/// `SetLabelsByRef`).
pub type LabelsByRefFn = dyn Fn(SeriesRef) -> Option<LabelSet> + Send + Sync;

/// Injected callback resolving a metric name to its metadata, already
/// wrapped with the synthetic/fallback layers described in §4.2 "Metadata
/// wrapping". The series cache only ever sees the fully-wrapped function.
pub type MetadataLookupFn<'a> = dyn Fn(&str) -> Option<MetricMetadata> + 'a;

/// The zero point against which outgoing cumulative values are computed
/// (§3 `CacheEntry.resetBaseline`).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ResetBaseline {
    /// Timestamp the baseline was recorded at.
    pub timestamp_ms: i64,
    /// The raw value at that timestamp.
    pub value: f64,
}

/// A pre-built, point-less target-series header (§3 `CacheEntry.protoTemplate`).
#[derive(Clone, Debug, PartialEq)]
pub struct ProtoTemplate {
    /// The monitored resource this series belongs to.
    pub resource: ResourceLabels,
    /// The synthesized metric type string.
    pub metric_type: String,
    /// Labels identifying the metric within its resource.
    pub metric_labels: LabelSet,
    /// Gauge or cumulative.
    pub kind: MetricKind,
}

/// One cached descriptor per [`SeriesRef`] (§3 `CacheEntry`).
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// The pre-built, point-less target-series header.
    pub proto_template: ProtoTemplate,
    /// The metadata that produced this entry's template.
    pub metadata: MetricMetadata,
    /// Which histogram/summary family member this series is, if any.
    pub metric_name_suffix: MetricNameSuffix,
    /// The metric name with `metric_name_suffix` stripped, where applicable.
    pub base_metric_name: String,
    /// The configured metric-type namespace prefix this entry's template
    /// was built with, kept so `companion_metric_type` can re-synthesize
    /// rather than string-concatenate.
    metric_type_prefix: String,
    /// The `kindSuffix` this entry's template was built with (§4.1).
    kind_word: KindSuffix,
    /// The 64-bit sharding hash (§3 `CacheEntry.hash`).
    pub hash: u64,
    /// The original label set, needed for histogram-family matching.
    pub lset: LabelSet,
    /// Wall-clock timestamp of the last touch, used for idle GC.
    pub last_refresh: Instant,
    /// The reset baseline for cumulative series; `None` for gauges/quantiles.
    pub reset_baseline: Option<ResetBaseline>,
    /// Bookkeeping for reset detection, distinct from `reset_baseline`:
    /// resets are detected against the most recently observed raw value,
    /// not the fixed start-of-epoch baseline value (see
    /// `SeriesCache::get_reset_adjusted` and DESIGN.md for the worked
    /// example this resolves).
    last_raw_value: Option<f64>,
    last_emitted_ts_ms: Option<i64>,
    /// Previous `(timestamp, value)` observed for an untyped series, used
    /// by the `:counter` companion emission (§4.2 "untyped extra"). Distinct
    /// from `reset_baseline`: the companion is a delta against the
    /// immediately preceding sample, not against a fixed epoch baseline.
    untyped_previous: Option<(i64, f64)>,
    /// Known not to match the configured series-selector filter, or
    /// otherwise unresolvable; skipped on every touch (§3).
    pub dropped: bool,
    built_generation: u64,
}

impl CacheEntry {
    /// The metric type string for the cumulative companion of an untyped
    /// or summary-sum series (§4.1 "Metric-type string synthesis", the
    /// `unknown:counter`/`summary:counter` `kindSuffix` variants):
    /// re-synthesized from this entry's own prefix and base name with the
    /// companion `kindSuffix` substituted in.
    #[must_use]
    pub fn companion_metric_type(&self) -> String {
        synthesize_metric_type(&self.metric_type_prefix, &self.base_metric_name, self.kind_word.counter_companion())
    }
}

/// The outcome of [`SeriesCache::get`]: `ok = false` means the caller
/// should skip this sample (either the entry is marked `dropped`, meaning
/// the series failed resolution or the selector filter, per §4.1).
pub struct GetResult {
    /// The resolved (possibly `dropped`) entry.
    pub entry: CacheEntry,
    /// `false` if the caller should skip this sample entirely.
    pub ok: bool,
}

/// The outcome of [`SeriesCache::get_reset_adjusted`] (§4.1).
pub struct ResetAdjusted {
    /// The start timestamp to emit with this cumulative point.
    pub start_timestamp_ms: i64,
    /// The reset-adjusted value to emit.
    pub value: f64,
    /// `false` if the caller should drop this sample (first sighting,
    /// duplicate, or out-of-order timestamp).
    pub ok: bool,
}

struct Entries {
    map: HashMap<SeriesRef, CacheEntry>,
    generation: u64,
}

/// Maps opaque series references to enriched descriptors, maintaining
/// reset baselines and idle garbage collection (§4.1).
pub struct SeriesCache {
    entries: Mutex<Entries>,
    labels_by_ref: OnceLock<Box<LabelsByRefFn>>,
    clock: Clock,
}

impl SeriesCache {
    /// Creates an empty cache using the real monotonic clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Clock::new())
    }

    /// Creates an empty cache using the given clock; tests use
    /// `quanta::Clock::mock()` the same way the teacher's
    /// `distribution.rs` tests do.
    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self { entries: Mutex::new(Entries { map: HashMap::new(), generation: 0 }), labels_by_ref: OnceLock::new(), clock }
    }

    /// Injects the producer's label-resolution callback. May only be
    /// called once; a second call is an invariant violation and panics
    /// (§7 "Invariant violations ... duplicate SetLabelsByRef").
    pub fn set_labels_by_ref<F>(&self, f: F)
    where
        F: Fn(SeriesRef) -> Option<LabelSet> + Send + Sync + 'static,
    {
        self.labels_by_ref
            .set(Box::new(f))
            .unwrap_or_else(|_| panic!("SetLabelsByRef called more than once"));
    }

    /// Resolves `series_ref`, building and caching a fresh entry on first
    /// access or after it goes stale (§4.1 `get`).
    pub fn get(
        &self,
        series_ref: SeriesRef,
        config: &ExporterConfig,
        metadata_lookup: &MetadataLookupFn<'_>,
    ) -> GetResult {
        let now = self.clock.now();
        let mut guard = self.entries.lock();
        let generation = guard.generation;

        let needs_rebuild = match guard.map.get(&series_ref) {
            None => true,
            Some(entry) => {
                entry.built_generation != generation
                    || now.duration_since(entry.last_refresh) > crate::config::DEFAULT_REFRESH_INTERVAL
            }
        };

        if needs_rebuild {
            let built = self.build_entry(series_ref, config, metadata_lookup, now, generation);
            guard.map.insert(series_ref, built);
        } else if let Some(entry) = guard.map.get_mut(&series_ref) {
            entry.last_refresh = now;
        }

        let entry = guard.map.get(&series_ref).expect("just inserted or present").clone();
        let ok = !entry.dropped;
        GetResult { entry, ok }
    }

    fn build_entry(
        &self,
        series_ref: SeriesRef,
        config: &ExporterConfig,
        metadata_lookup: &MetadataLookupFn<'_>,
        now: Instant,
        generation: u64,
    ) -> CacheEntry {
        let labels_by_ref =
            self.labels_by_ref.get().expect("SetLabelsByRef must be called before Export");

        let lset = match labels_by_ref(series_ref) {
            Some(lset) => lset,
            None => {
                debug!(?series_ref, "series cache: no label set for series reference");
                return dropped_sentinel(series_ref, now, generation);
            }
        };

        let metric_name = match lset.metric_name() {
            Some(name) => name.to_owned(),
            None => {
                warn!(?series_ref, "series cache: series is missing __name__");
                return dropped_sentinel_with_lset(lset, now, generation);
            }
        };

        let metadata = match metadata_lookup(&metric_name) {
            Some(metadata) => metadata,
            None => {
                debug!(metric = %metric_name, "series cache: no metadata resolvable");
                return dropped_sentinel_with_lset(lset, now, generation);
            }
        };

        let (suffix, base_metric_name) = compute_suffix(&metric_name, &metadata);

        let resource = match resolve_resource_labels(&lset, config) {
            Ok(resource) => resource,
            Err(_) => {
                return dropped_sentinel_with_lset(lset, now, generation);
            }
        };

        let kind_word = base_kind_word(metadata.metric_type, suffix);
        let metric_type =
            synthesize_metric_type(&config.metric_type_prefix, &base_metric_name, kind_word);
        let kind = kind_word.metric_kind();

        let metric_labels = metric_labels_for(&lset, suffix);

        let dropped = !config.matchers.is_empty()
            && !config.matchers.iter().any(|matcher| matcher.matches(&lset));

        let hash = rapidhash_label_set(&resource, &metric_labels, kind_word.as_str());

        CacheEntry {
            proto_template: ProtoTemplate { resource, metric_type, metric_labels, kind },
            metadata,
            metric_name_suffix: suffix,
            base_metric_name,
            metric_type_prefix: config.metric_type_prefix.clone(),
            kind_word,
            hash,
            lset,
            last_refresh: now,
            reset_baseline: None,
            last_raw_value: None,
            last_emitted_ts_ms: None,
            untyped_previous: None,
            dropped,
            built_generation: generation,
        }
    }

    /// Maintains the reset baseline for a cumulative series and returns the
    /// adjusted `(start, value)` to emit, or `ok = false` if the caller
    /// should drop this sample (§4.1 `getResetAdjusted`).
    ///
    /// Reset detection compares the incoming raw value against the most
    /// recently *observed* raw value, not the fixed epoch baseline value —
    /// see DESIGN.md for why the literal baseline-value comparison in the
    /// distilled wording can't reproduce the worked reset example.
    pub fn get_reset_adjusted(&self, series_ref: SeriesRef, timestamp_ms: i64, raw_value: f64) -> ResetAdjusted {
        let mut guard = self.entries.lock();
        let Some(entry) = guard.map.get_mut(&series_ref) else {
            return ResetAdjusted { start_timestamp_ms: 0, value: 0.0, ok: false };
        };

        match entry.reset_baseline {
            None => {
                entry.reset_baseline = Some(ResetBaseline { timestamp_ms, value: raw_value });
                entry.last_raw_value = Some(raw_value);
                ResetAdjusted { start_timestamp_ms: 0, value: 0.0, ok: false }
            }
            Some(baseline) => {
                let is_duplicate_of_baseline = entry.last_emitted_ts_ms.is_none()
                    && timestamp_ms == baseline.timestamp_ms
                    && raw_value == baseline.value;
                if is_duplicate_of_baseline {
                    return ResetAdjusted { start_timestamp_ms: 0, value: 0.0, ok: false };
                }

                if let Some(last_ts) = entry.last_emitted_ts_ms {
                    if timestamp_ms <= last_ts {
                        return ResetAdjusted { start_timestamp_ms: 0, value: 0.0, ok: false };
                    }
                }

                let last_raw = entry.last_raw_value.unwrap_or(baseline.value);
                if raw_value < last_raw {
                    let reset_ts = timestamp_ms - 1;
                    entry.reset_baseline = Some(ResetBaseline { timestamp_ms: reset_ts, value: 0.0 });
                    entry.last_raw_value = Some(raw_value);
                    entry.last_emitted_ts_ms = Some(timestamp_ms);
                    ResetAdjusted { start_timestamp_ms: reset_ts, value: raw_value, ok: true }
                } else {
                    entry.last_raw_value = Some(raw_value);
                    entry.last_emitted_ts_ms = Some(timestamp_ms);
                    ResetAdjusted {
                        start_timestamp_ms: baseline.timestamp_ms,
                        value: raw_value - baseline.value,
                        ok: true,
                    }
                }
            }
        }
    }

    /// Maintains the `untyped_previous` state for an untyped series and
    /// returns the `:counter` companion delta to emit, if any (§4.2
    /// "untyped extra").
    ///
    /// The first observed sample seeds `untyped_previous` and returns
    /// `None` (gauge-only emission). Every subsequent sample returns
    /// `Some((previous_timestamp_ms, raw_value - previous_value))`,
    /// regardless of sign — see DESIGN.md for why a negative or
    /// decreasing delta is passed through rather than clamped or
    /// reset-detected (the Open Question in §9 about this case).
    pub fn get_untyped_companion(
        &self,
        series_ref: SeriesRef,
        timestamp_ms: i64,
        raw_value: f64,
    ) -> Option<(i64, f64)> {
        let mut guard = self.entries.lock();
        let entry = guard.map.get_mut(&series_ref)?;
        let previous = entry.untyped_previous.replace((timestamp_ms, raw_value));
        previous.map(|(prev_ts, prev_value)| (prev_ts, raw_value - prev_value))
    }

    /// Marks every entry stale so the next `get` rebuilds it (§4.1
    /// `forceRefresh`). Called on configuration change and lease-leadership
    /// loss.
    pub fn force_refresh(&self) {
        let mut guard = self.entries.lock();
        guard.generation += 1;
    }

    /// Discards every entry, including reset baselines (§4.1 `clear`).
    /// Called on lease reacquisition to avoid carrying stale baselines
    /// across leadership gaps.
    pub fn clear(&self) {
        let mut guard = self.entries.lock();
        guard.map.clear();
    }

    /// Removes entries whose `lastRefresh` is older than `max_idle` (§4.1
    /// `garbageCollect`).
    pub fn garbage_collect(&self, max_idle: std::time::Duration) {
        let now = self.clock.now();
        let mut guard = self.entries.lock();
        let before = guard.map.len();
        guard.map.retain(|_, entry| now.duration_since(entry.last_refresh) < max_idle);
        let removed = before - guard.map.len();
        if removed > 0 {
            debug!(removed, "series cache: garbage collected idle entries");
        }
    }

    /// Number of cached entries (test/telemetry helper).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SeriesCache {
    fn default() -> Self {
        Self::new()
    }
}

fn dropped_sentinel(series_ref: SeriesRef, now: Instant, generation: u64) -> CacheEntry {
    dropped_sentinel_with_lset(LabelSet::from_pairs([(
        "series_ref".to_owned(),
        series_ref.0.to_string(),
    )]), now, generation)
}

fn dropped_sentinel_with_lset(lset: LabelSet, now: Instant, generation: u64) -> CacheEntry {
    CacheEntry {
        proto_template: ProtoTemplate {
            resource: ResourceLabels::default(),
            metric_type: String::new(),
            metric_labels: LabelSet::new(),
            kind: MetricKind::Gauge,
        },
        metadata: MetricMetadata {
            name: String::new(),
            metric_type: MetricType::Untyped,
            help: String::new(),
            unit: String::new(),
        },
        metric_name_suffix: MetricNameSuffix::None,
        base_metric_name: String::new(),
        metric_type_prefix: String::new(),
        kind_word: KindSuffix::Unknown,
        hash: 0,
        lset,
        last_refresh: now,
        reset_baseline: None,
        last_raw_value: None,
        last_emitted_ts_ms: None,
        untyped_previous: None,
        dropped: true,
        built_generation: generation,
    }
}

/// Resource-label precedence chain (§4.1): series labels override
/// explicit config values, which override external labels. `project_id`
/// and `location` are mandatory; the remaining slots default to `""`.
fn resolve_resource_labels(lset: &LabelSet, config: &ExporterConfig) -> Result<ResourceLabels, ()> {
    let resolve = |slot: &str, config_value: Option<&str>| -> Option<String> {
        lset.get(slot)
            .map(str::to_owned)
            .or_else(|| config_value.map(str::to_owned))
            .or_else(|| config.external_labels.get(slot).cloned())
    };

    let project_id = resolve("project_id", config.project_id.as_deref());
    let location = resolve("location", config.location.as_deref());
    let cluster = resolve("cluster", config.cluster.as_deref()).unwrap_or_default();
    let namespace = resolve("namespace", None).unwrap_or_default();
    let job = resolve("job", None).unwrap_or_default();
    let instance = resolve("instance", None).unwrap_or_default();

    let (Some(project_id), Some(location)) = (project_id, location) else {
        return Err(());
    };

    Ok(ResourceLabels { project_id, location, cluster, namespace, job, instance })
}

/// The resource label slot names, excluded from the metric-label set
/// (§3 "all remaining labels").
const RESOURCE_LABEL_SLOTS: [&str; 6] =
    ["project_id", "location", "cluster", "namespace", "job", "instance"];

fn metric_labels_for(lset: &LabelSet, suffix: MetricNameSuffix) -> LabelSet {
    let mut labels = lset.without("__name__");
    if suffix == MetricNameSuffix::Bucket {
        labels = labels.without("le");
    }
    for slot in RESOURCE_LABEL_SLOTS {
        labels = labels.without(slot);
    }
    labels
}

fn compute_suffix(metric_name: &str, metadata: &MetricMetadata) -> (MetricNameSuffix, String) {
    match metadata.metric_type {
        MetricType::Histogram => {
            if let Some(base) = metric_name.strip_suffix("_bucket") {
                (MetricNameSuffix::Bucket, base.to_owned())
            } else if let Some(base) = metric_name.strip_suffix("_sum") {
                (MetricNameSuffix::Sum, base.to_owned())
            } else if let Some(base) = metric_name.strip_suffix("_count") {
                (MetricNameSuffix::Count, base.to_owned())
            } else {
                (MetricNameSuffix::None, metric_name.to_owned())
            }
        }
        MetricType::Summary => {
            if let Some(base) = metric_name.strip_suffix("_sum") {
                (MetricNameSuffix::Sum, base.to_owned())
            } else if let Some(base) = metric_name.strip_suffix("_count") {
                (MetricNameSuffix::Count, base.to_owned())
            } else {
                (MetricNameSuffix::None, metric_name.to_owned())
            }
        }
        _ => (MetricNameSuffix::None, metric_name.to_owned()),
    }
}

/// `kindSuffix` synthesis (§4.1): the word that appears in the metric type
/// string, derived from the metric's Prometheus type and, for
/// summaries/histograms, which sibling this particular series is.
fn base_kind_word(metric_type: MetricType, suffix: MetricNameSuffix) -> KindSuffix {
    match (metric_type, suffix) {
        (MetricType::Gauge, _) => KindSuffix::Gauge,
        (MetricType::Untyped, _) => KindSuffix::Unknown,
        (MetricType::Counter, _) => KindSuffix::Counter,
        (MetricType::Summary, MetricNameSuffix::Count) => KindSuffix::Counter,
        (MetricType::Summary, _) => KindSuffix::Summary,
        (MetricType::Histogram, _) => KindSuffix::Histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExporterConfigBuilder;
    use crate::types::MetricType;
    use indexmap::IndexMap;

    fn test_config() -> ExporterConfig {
        ExporterConfigBuilder::new()
            .project_id("proj")
            .location("us-central1")
            .build()
            .expect("valid config")
    }

    fn gauge_metadata(name: &str) -> MetricMetadata {
        MetricMetadata {
            name: name.to_owned(),
            metric_type: MetricType::Gauge,
            help: String::new(),
            unit: String::new(),
        }
    }

    #[test]
    fn resolves_resource_labels_with_precedence() {
        let lset = LabelSet::from_pairs([
            ("__name__".to_owned(), "metric1".to_owned()),
            ("job".to_owned(), "j".to_owned()),
            ("instance".to_owned(), "i".to_owned()),
        ]);
        let mut external = IndexMap::new();
        external.insert("project_id".to_owned(), "p".to_owned());
        external.insert("location".to_owned(), "l".to_owned());
        external.insert("cluster".to_owned(), "c".to_owned());
        let config = ExporterConfigBuilder::new().external_labels(external).build().unwrap();

        let resource = resolve_resource_labels(&lset, &config).unwrap();
        assert_eq!(resource.project_id, "p");
        assert_eq!(resource.location, "l");
        assert_eq!(resource.cluster, "c");
        assert_eq!(resource.job, "j");
        assert_eq!(resource.instance, "i");
        assert_eq!(resource.namespace, "");
    }

    #[test]
    fn missing_project_id_is_unresolvable() {
        let lset = LabelSet::from_pairs([("__name__".to_owned(), "metric1".to_owned())]);
        let config = ExporterConfigBuilder::new().location("l").build().unwrap();
        assert!(resolve_resource_labels(&lset, &config).is_err());
    }

    #[test]
    fn get_builds_and_caches_entry() {
        let cache = SeriesCache::new();
        cache.set_labels_by_ref(|_| {
            Some(LabelSet::from_pairs([
                ("__name__".to_owned(), "metric1".to_owned()),
                ("job".to_owned(), "j".to_owned()),
                ("instance".to_owned(), "i".to_owned()),
            ]))
        });
        let config = test_config();
        let result = cache.get(SeriesRef(1), &config, &|name| Some(gauge_metadata(name)));
        assert!(result.ok);
        assert_eq!(result.entry.proto_template.metric_type, "custom.googleapis.com/metric1/gauge");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    #[should_panic(expected = "more than once")]
    fn duplicate_set_labels_by_ref_panics() {
        let cache = SeriesCache::new();
        cache.set_labels_by_ref(|_| None);
        cache.set_labels_by_ref(|_| None);
    }

    #[test]
    fn counter_reset_sequence_matches_worked_example() {
        let cache = SeriesCache::new();
        cache.set_labels_by_ref(|_| {
            Some(LabelSet::from_pairs([("__name__".to_owned(), "requests_total".to_owned())]))
        });
        let config = test_config();
        let metadata_lookup = |name: &str| {
            Some(MetricMetadata {
                name: name.to_owned(),
                metric_type: MetricType::Counter,
                help: String::new(),
                unit: String::new(),
            })
        };
        let _ = cache.get(SeriesRef(7), &config, &metadata_lookup);

        let r1 = cache.get_reset_adjusted(SeriesRef(7), 2000, 5.5);
        assert!(!r1.ok);

        let r2 = cache.get_reset_adjusted(SeriesRef(7), 3000, 8.0);
        assert!(r2.ok);
        assert_eq!(r2.start_timestamp_ms, 2000);
        assert!((r2.value - 2.5).abs() < 1e-9);

        let r3 = cache.get_reset_adjusted(SeriesRef(7), 4000, 9.0);
        assert!(r3.ok);
        assert_eq!(r3.start_timestamp_ms, 2000);
        assert!((r3.value - 3.5).abs() < 1e-9);

        let r4 = cache.get_reset_adjusted(SeriesRef(7), 5000, 7.0);
        assert!(r4.ok);
        assert_eq!(r4.start_timestamp_ms, 4999);
        assert!((r4.value - 7.0).abs() < 1e-9);
    }

    #[test]
    fn duplicate_count_sample_is_suppressed() {
        let cache = SeriesCache::new();
        cache.set_labels_by_ref(|_| {
            Some(LabelSet::from_pairs([("__name__".to_owned(), "req_count".to_owned())]))
        });
        let config = test_config();
        let metadata_lookup = |name: &str| {
            Some(MetricMetadata {
                name: name.to_owned(),
                metric_type: MetricType::Counter,
                help: String::new(),
                unit: String::new(),
            })
        };
        let _ = cache.get(SeriesRef(9), &config, &metadata_lookup);

        let first = cache.get_reset_adjusted(SeriesRef(9), 1000, 3.0);
        assert!(!first.ok);
        let second = cache.get_reset_adjusted(SeriesRef(9), 1000, 3.0);
        assert!(!second.ok);
    }

    #[test]
    fn garbage_collect_zero_removes_all_infinite_is_noop() {
        let (clock, mock) = Clock::mock();
        let cache = SeriesCache::with_clock(clock);
        cache.set_labels_by_ref(|_| {
            Some(LabelSet::from_pairs([("__name__".to_owned(), "metric1".to_owned())]))
        });
        let config = test_config();
        let _ = cache.get(SeriesRef(1), &config, &|name| Some(gauge_metadata(name)));
        mock.increment(std::time::Duration::from_secs(1));

        cache.garbage_collect(std::time::Duration::MAX);
        assert_eq!(cache.len(), 1);

        cache.garbage_collect(std::time::Duration::ZERO);
        assert_eq!(cache.len(), 0);
    }
}
