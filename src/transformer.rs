//! The sample transformer (§4.2, §4.2.1): converts Prometheus's data model
//! into the target API's point model, detecting cumulative-counter resets
//! and assembling histogram families that span several sibling series.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::warn;

use crate::common::DropReason;
use crate::config::ExporterConfig;
use crate::series_cache::{CacheEntry, SeriesCache};
use crate::types::{
    is_stale_marker, DistributionValue, Exemplar, Interval, MetricMetadata, MetricNameSuffix, MetricType,
    PointExemplar, PointValue, Sample, SeriesRef, TargetPoint,
};

const SYNTHETIC_METRICS: &[&str] = &[
    "up",
    "scrape_samples_scraped",
    "scrape_duration_seconds",
    "scrape_samples_post_metric_relabeling",
    "scrape_series_added",
];

fn synthetic_metadata(name: &str) -> Option<MetricMetadata> {
    SYNTHETIC_METRICS.contains(&name).then(|| MetricMetadata {
        name: name.to_owned(),
        metric_type: MetricType::Gauge,
        help: String::new(),
        unit: String::new(),
    })
}

/// Wraps the caller's `metadata_fn` with the two layers described in §4.2
/// "Metadata wrapping": an inner layer answering for producer-synthetic
/// metrics, and an outer layer that falls back to the base family's
/// metadata (stripping `_sum`/`_count`/`_bucket`) and finally to a
/// synthesized `untyped` entry, logging once per metric name.
pub struct MetadataResolver<'a> {
    raw: Option<&'a dyn Fn(&str) -> Option<MetricMetadata>>,
    warned: Mutex<HashSet<String>>,
}

impl<'a> MetadataResolver<'a> {
    /// `metadata_fn = None` uses the always-gauge default (§4.2: "this
    /// path handles samples produced by rule evaluation, which are always
    /// gauges").
    #[must_use]
    pub fn new(metadata_fn: Option<&'a dyn Fn(&str) -> Option<MetricMetadata>>) -> Self {
        Self { raw: metadata_fn, warned: Mutex::new(HashSet::new()) }
    }

    fn inner(&self, name: &str) -> Option<MetricMetadata> {
        synthetic_metadata(name).or_else(|| match self.raw {
            Some(f) => f(name),
            None => Some(MetricMetadata { name: name.to_owned(), metric_type: MetricType::Gauge, help: String::new(), unit: String::new() }),
        })
    }

    /// Resolves metadata for `name`, which may carry a histogram/summary
    /// suffix.
    pub fn resolve(&self, name: &str) -> MetricMetadata {
        if let Some(found) = self.inner(name) {
            return found;
        }

        for suffix in ["_bucket", "_sum", "_count"] {
            if let Some(base) = name.strip_suffix(suffix) {
                if let Some(found) = self.inner(base) {
                    return found;
                }
            }
        }

        if self.warned.lock().insert(name.to_owned()) {
            warn!(metric = %name, "transformer: no metadata resolvable, synthesizing untyped");
        }
        MetricMetadata { name: name.to_owned(), metric_type: MetricType::Untyped, help: String::new(), unit: String::new() }
    }

    fn as_lookup_fn(&self) -> impl Fn(&str) -> Option<MetricMetadata> + '_ {
        move |name| Some(self.resolve(name))
    }
}

/// Per-reason drop counters, incremented as the transformer walks a batch
/// (§4.5 "Self-telemetry"). Exposed as a struct rather than calling
/// `metrics::counter!` inline so tests can assert on drop reasons without
/// a recorder installed.
#[derive(Default)]
pub struct DropCounters {
    counts: Mutex<HashMap<DropReason, u64>>,
}

impl DropCounters {
    pub fn record(&self, reason: DropReason) {
        metrics::counter!("cloud_metrics_export_dropped_total", "reason" => reason.as_label()).increment(1);
        *self.counts.lock().entry(reason).or_default() += 1;
    }

    #[must_use]
    pub fn get(&self, reason: DropReason) -> u64 {
        *self.counts.lock().get(&reason).unwrap_or(&0)
    }
}

/// Consumes one leading unit of work (a single sample, or a whole
/// histogram family) from `samples[start..]` and returns whatever target
/// points it produced plus how many input samples were consumed (§4.2
/// `next`).
///
/// Never returns `0` consumed on a non-empty input: a malformed histogram
/// walk still consumes one sample to guarantee forward progress (§4.2.1
/// "If the walk consumes zero samples").
pub fn next(
    cache: &SeriesCache,
    config: &ExporterConfig,
    resolver: &MetadataResolver<'_>,
    samples: &[Sample],
    start: usize,
    exemplars_by_ref: &HashMap<SeriesRef, Exemplar>,
    drops: &DropCounters,
) -> (Vec<TargetPoint>, usize) {
    let lookup = resolver.as_lookup_fn();
    let sample = samples[start];

    if is_stale_marker(sample.value) {
        drops.record(DropReason::StalenessMarker);
        return (Vec::new(), 1);
    }

    let result = cache.get(sample.series_ref, config, &lookup);
    if !result.ok {
        drops.record(DropReason::NoCacheSeriesFound);
        return (Vec::new(), 1);
    }
    let entry = result.entry;

    match entry.metadata.metric_type {
        MetricType::Histogram => assemble_histogram(cache, config, resolver, samples, start, exemplars_by_ref, drops),
        MetricType::Summary => (emit_summary(cache, &entry, sample), 1),
        MetricType::Counter => (emit_counter(cache, &entry, sample), 1),
        MetricType::Gauge => (vec![gauge_point(&entry, sample)], 1),
        MetricType::Untyped => (emit_untyped(cache, &entry, sample), 1),
    }
}

/// Runs [`next`] over the whole batch, returning every emitted point
/// (§4.2 top-level `Export` usage of the transformer).
pub fn transform_batch(
    cache: &SeriesCache,
    config: &ExporterConfig,
    metadata_fn: Option<&dyn Fn(&str) -> Option<MetricMetadata>>,
    samples: &[Sample],
    exemplars_by_ref: &HashMap<SeriesRef, Exemplar>,
    drops: &DropCounters,
) -> Vec<TargetPoint> {
    let resolver = MetadataResolver::new(metadata_fn);
    let mut emitted = Vec::new();
    let mut i = 0;
    while i < samples.len() {
        let (points, consumed) = next(cache, config, &resolver, samples, i, exemplars_by_ref, drops);
        emitted.extend(points);
        debug_assert!(consumed >= 1, "next() must always make forward progress");
        i += consumed.max(1);
    }
    emitted
}

fn gauge_point(entry: &CacheEntry, sample: Sample) -> TargetPoint {
    TargetPoint {
        resource: entry.proto_template.resource.clone(),
        metric_type: entry.proto_template.metric_type.clone(),
        metric_labels: entry.proto_template.metric_labels.clone(),
        kind: crate::types::MetricKind::Gauge,
        interval: Interval { start_ms: None, end_ms: sample.timestamp_ms },
        value: PointValue::Double(sample.value),
        hash: entry.hash,
    }
}

fn emit_counter(cache: &SeriesCache, entry: &CacheEntry, sample: Sample) -> Vec<TargetPoint> {
    let adjusted = cache.get_reset_adjusted(sample.series_ref, sample.timestamp_ms, sample.value);
    if !adjusted.ok {
        return Vec::new();
    }
    vec![TargetPoint {
        resource: entry.proto_template.resource.clone(),
        metric_type: entry.proto_template.metric_type.clone(),
        metric_labels: entry.proto_template.metric_labels.clone(),
        kind: crate::types::MetricKind::Cumulative,
        interval: Interval { start_ms: Some(adjusted.start_timestamp_ms), end_ms: sample.timestamp_ms },
        value: PointValue::Double(adjusted.value),
        hash: entry.hash,
    }]
}

fn emit_untyped(cache: &SeriesCache, entry: &CacheEntry, sample: Sample) -> Vec<TargetPoint> {
    let mut points = vec![gauge_point(entry, sample)];
    if let Some((prev_ts, delta)) = cache.get_untyped_companion(sample.series_ref, sample.timestamp_ms, sample.value) {
        points.push(TargetPoint {
            resource: entry.proto_template.resource.clone(),
            metric_type: entry.companion_metric_type(),
            metric_labels: entry.proto_template.metric_labels.clone(),
            kind: crate::types::MetricKind::Cumulative,
            interval: Interval { start_ms: Some(prev_ts), end_ms: sample.timestamp_ms },
            value: PointValue::Double(delta),
            hash: entry.hash,
        });
    }
    points
}

fn emit_summary(cache: &SeriesCache, entry: &CacheEntry, sample: Sample) -> Vec<TargetPoint> {
    match entry.metric_name_suffix {
        MetricNameSuffix::Sum => {
            let mut points = vec![gauge_point(entry, sample)];
            let adjusted = cache.get_reset_adjusted(sample.series_ref, sample.timestamp_ms, sample.value);
            if adjusted.ok {
                points.push(TargetPoint {
                    resource: entry.proto_template.resource.clone(),
                    metric_type: entry.companion_metric_type(),
                    metric_labels: entry.proto_template.metric_labels.clone(),
                    kind: crate::types::MetricKind::Cumulative,
                    interval: Interval { start_ms: Some(adjusted.start_timestamp_ms), end_ms: sample.timestamp_ms },
                    value: PointValue::Double(adjusted.value),
                    hash: entry.hash,
                });
            }
            points
        }
        MetricNameSuffix::Count => emit_counter(cache, entry, sample),
        MetricNameSuffix::None | MetricNameSuffix::Bucket => vec![gauge_point(entry, sample)],
    }
}

struct Bucket {
    upper_bound: f64,
    cumulative_count: f64,
}

/// Histogram family assembly (§4.2.1).
fn assemble_histogram(
    cache: &SeriesCache,
    config: &ExporterConfig,
    resolver: &MetadataResolver<'_>,
    samples: &[Sample],
    start: usize,
    exemplars_by_ref: &HashMap<SeriesRef, Exemplar>,
    drops: &DropCounters,
) -> (Vec<TargetPoint>, usize) {
    let lookup = resolver.as_lookup_fn();
    let leading_sample = samples[start];
    let leading = cache.get(leading_sample.series_ref, config, &lookup).entry;

    struct Accepted {
        sample: Sample,
        entry: CacheEntry,
    }
    let mut accepted = Vec::new();
    let mut idx = start;
    while idx < samples.len() {
        let sample = samples[idx];
        let result = cache.get(sample.series_ref, config, &lookup);
        if !result.ok {
            break;
        }
        let entry = result.entry;
        let base_matches = entry.base_metric_name == leading.base_metric_name;
        let lset_matches = entry.lset.matches_ignoring(&leading.lset, &["__name__", "le"]);
        let ts_matches = sample.timestamp_ms == leading_sample.timestamp_ms;
        if !(base_matches && lset_matches && ts_matches) {
            break;
        }
        accepted.push(Accepted { sample, entry });
        idx += 1;
    }

    if accepted.is_empty() {
        warn!(series_ref = ?leading_sample.series_ref, "transformer: histogram walk consumed zero samples");
        return (Vec::new(), 1);
    }
    let consumed = accepted.len();

    let mut sum = 0.0_f64;
    let mut count: Option<f64> = None;
    let mut start_timestamp_ms: Option<i64> = None;
    let mut raw_buckets: Vec<Bucket> = Vec::new();
    let mut bucket_refs: Vec<SeriesRef> = Vec::new();

    // Every accepted sibling must run through `get_reset_adjusted`, even
    // once some earlier sibling has already turned out to be a first
    // sighting (`ok = false`): the call is what seeds that sibling's own
    // baseline, and skipping it here would mean the family never finishes
    // seeding and never emits on a later set. So a failure only records
    // *which* reason to discard for and keeps walking; the actual early
    // return happens once, after every sibling has been touched.
    let mut discard_reason: Option<DropReason> = None;

    for item in &accepted {
        match item.entry.metric_name_suffix {
            MetricNameSuffix::Sum => {
                let adjusted = cache.get_reset_adjusted(item.sample.series_ref, item.sample.timestamp_ms, item.sample.value);
                if adjusted.ok {
                    sum = adjusted.value;
                } else {
                    discard_reason.get_or_insert(DropReason::ZeroHistogramSamplesProcessed);
                }
            }
            MetricNameSuffix::Count => {
                let adjusted = cache.get_reset_adjusted(item.sample.series_ref, item.sample.timestamp_ms, item.sample.value);
                if adjusted.ok {
                    count = Some(adjusted.value);
                    start_timestamp_ms = Some(adjusted.start_timestamp_ms);
                } else {
                    discard_reason.get_or_insert(DropReason::ZeroHistogramSamplesProcessed);
                }
            }
            MetricNameSuffix::Bucket => {
                let Some(le) = item.entry.lset.get("le") else {
                    discard_reason.get_or_insert(DropReason::MalformedBucketLeLabel);
                    continue;
                };
                let Ok(upper_bound) = le.parse::<f64>() else {
                    discard_reason.get_or_insert(DropReason::MalformedBucketLeLabel);
                    continue;
                };
                // Each bucket is itself a cumulative counter sharing the
                // family's reset epoch; reset-adjust before differencing
                // across buckets (see DESIGN.md worked example).
                let adjusted = cache.get_reset_adjusted(item.sample.series_ref, item.sample.timestamp_ms, item.sample.value);
                if adjusted.ok {
                    raw_buckets.push(Bucket { upper_bound, cumulative_count: adjusted.value });
                    bucket_refs.push(item.sample.series_ref);
                } else {
                    discard_reason.get_or_insert(DropReason::ZeroHistogramSamplesProcessed);
                }
            }
            MetricNameSuffix::None => {
                warn!("transformer: histogram sibling has no suffix, ignoring");
            }
        }
    }

    if let Some(reason) = discard_reason {
        drops.record(reason);
        return (Vec::new(), consumed);
    }

    let Some(count) = count else {
        drops.record(DropReason::ZeroHistogramSamplesProcessed);
        return (Vec::new(), consumed);
    };
    let start_timestamp_ms = start_timestamp_ms.expect("count branch always sets start_timestamp_ms");

    raw_buckets.retain(|b| b.upper_bound.is_finite());
    if raw_buckets.is_empty() {
        drops.record(DropReason::ZeroBucketsBounds);
        return (Vec::new(), consumed);
    }
    raw_buckets.sort_by(|a, b| a.upper_bound.total_cmp(&b.upper_bound));

    let mut bucket_counts = Vec::with_capacity(raw_buckets.len() + 1);
    let mut previous_cumulative = 0.0_f64;
    for bucket in &raw_buckets {
        let differential = bucket.cumulative_count - previous_cumulative;
        if differential < 0.0 {
            warn!(
                upper_bound = bucket.upper_bound,
                differential, "transformer: negative bucket count differential, discarding histogram"
            );
            drops.record(DropReason::NegativeBucketCount);
            return (Vec::new(), consumed);
        }
        bucket_counts.push(differential);
        previous_cumulative = bucket.cumulative_count;
    }
    let top_bucket_count = count - previous_cumulative;
    if top_bucket_count < 0.0 {
        drops.record(DropReason::NegativeBucketCount);
        return (Vec::new(), consumed);
    }
    bucket_counts.push(top_bucket_count);

    let mean = if count == 0.0 { 0.0 } else { sum / count };

    let mut sum_of_squared_deviation = 0.0_f64;
    for (i, bucket_count) in bucket_counts.iter().enumerate() {
        let (lower, upper) = bucket_bounds_for(&raw_buckets, i);
        let midpoint = if i == raw_buckets.len() { lower } else { (lower + upper) / 2.0 };
        sum_of_squared_deviation += bucket_count * (midpoint - mean).powi(2);
    }

    if count == 0.0 && (mean != 0.0 || sum_of_squared_deviation != 0.0) {
        drops.record(DropReason::ZeroCountViolation);
        return (Vec::new(), consumed);
    }

    let bucket_bounds: Vec<f64> = raw_buckets.iter().map(|b| b.upper_bound).collect();
    let emit_interval = Interval { start_ms: Some(start_timestamp_ms), end_ms: leading_sample.timestamp_ms };
    let exemplars = collect_exemplars(&bucket_refs, exemplars_by_ref, emit_interval);

    let point = TargetPoint {
        resource: leading.proto_template.resource.clone(),
        metric_type: leading.proto_template.metric_type.clone(),
        metric_labels: leading.proto_template.metric_labels.clone(),
        kind: crate::types::MetricKind::Cumulative,
        interval: emit_interval,
        value: PointValue::Distribution(DistributionValue {
            count: count as u64,
            mean,
            sum_of_squared_deviation,
            bucket_bounds,
            bucket_counts: bucket_counts.iter().map(|c| *c as u64).collect(),
            exemplars,
        }),
        hash: leading.hash,
    };

    (vec![point], consumed)
}

fn bucket_bounds_for(buckets: &[Bucket], index: usize) -> (f64, f64) {
    let lower = if index == 0 { 0.0 } else { buckets[index - 1].upper_bound };
    let upper = if index < buckets.len() { buckets[index].upper_bound } else { lower };
    (lower, upper)
}

fn collect_exemplars(
    bucket_refs: &[SeriesRef],
    exemplars_by_ref: &HashMap<SeriesRef, Exemplar>,
    emit_interval: Interval,
) -> Vec<PointExemplar> {
    let start = emit_interval.start_ms.unwrap_or(i64::MIN);
    let end = emit_interval.end_ms;

    bucket_refs
        .iter()
        .filter_map(|series_ref| exemplars_by_ref.get(series_ref))
        .filter(|exemplar| exemplar.timestamp_ms >= start && exemplar.timestamp_ms <= end)
        .map(|exemplar| {
            let project_id = exemplar.labels.get("project_id");
            let trace_id = exemplar.labels.get("trace_id");
            let span_id = exemplar.labels.get("span_id");
            match (project_id, trace_id, span_id) {
                (Some(p), Some(t), Some(s)) => {
                    let span_name = format!("projects/{p}/traces/{t}/spans/{s}");
                    let dropped_labels = exemplar.labels.without("project_id").without("trace_id").without("span_id");
                    PointExemplar::SpanContext { value: exemplar.value, span_name, dropped_labels }
                }
                _ => PointExemplar::DroppedLabelsOnly { value: exemplar.value, dropped_labels: exemplar.labels.clone() },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExporterConfigBuilder;
    use crate::types::LabelSet;

    fn config() -> ExporterConfig {
        ExporterConfigBuilder::new().project_id("p").location("l").build().unwrap()
    }

    fn labels_for(ids: &HashMap<SeriesRef, LabelSet>) -> impl Fn(SeriesRef) -> Option<LabelSet> + '_ {
        move |r| ids.get(&r).cloned()
    }

    fn gauge_md(name: &str) -> MetricMetadata {
        MetricMetadata { name: name.to_owned(), metric_type: MetricType::Gauge, help: String::new(), unit: String::new() }
    }
    fn counter_md(name: &str) -> MetricMetadata {
        MetricMetadata { name: name.to_owned(), metric_type: MetricType::Counter, help: String::new(), unit: String::new() }
    }
    fn histogram_md(name: &str) -> MetricMetadata {
        MetricMetadata { name: name.to_owned(), metric_type: MetricType::Histogram, help: String::new(), unit: String::new() }
    }

    #[test]
    fn gauge_passthrough_emits_both_samples() {
        let cache = SeriesCache::new();
        let mut ids = HashMap::new();
        ids.insert(
            SeriesRef(1),
            LabelSet::from_pairs([
                ("__name__".to_owned(), "metric1".to_owned()),
                ("k1".to_owned(), "v1".to_owned()),
                ("job".to_owned(), "j".to_owned()),
                ("instance".to_owned(), "i".to_owned()),
            ]),
        );
        cache.set_labels_by_ref(labels_for(&ids));
        let cfg = config();
        let meta = |name: &str| Some(gauge_md(name));
        let samples = vec![
            Sample { series_ref: SeriesRef(1), timestamp_ms: 3000, value: 0.6 },
            Sample { series_ref: SeriesRef(1), timestamp_ms: 4000, value: f64::INFINITY },
        ];
        let drops = DropCounters::default();
        let emitted = transform_batch(&cache, &cfg, Some(&meta), &samples, &HashMap::new(), &drops);
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].metric_type, "custom.googleapis.com/metric1/gauge");
        assert_eq!(emitted[0].value, PointValue::Double(0.6));
        assert_eq!(emitted[1].value, PointValue::Double(f64::INFINITY));
    }

    #[test]
    fn counter_reset_sequence() {
        let cache = SeriesCache::new();
        let mut ids = HashMap::new();
        ids.insert(SeriesRef(7), LabelSet::from_pairs([("__name__".to_owned(), "requests_total".to_owned())]));
        cache.set_labels_by_ref(labels_for(&ids));
        let cfg = config();
        let meta = |name: &str| Some(counter_md(name));
        let samples = vec![
            Sample { series_ref: SeriesRef(7), timestamp_ms: 2000, value: 5.5 },
            Sample { series_ref: SeriesRef(7), timestamp_ms: 3000, value: 8.0 },
            Sample { series_ref: SeriesRef(7), timestamp_ms: 4000, value: 9.0 },
            Sample { series_ref: SeriesRef(7), timestamp_ms: 5000, value: 7.0 },
        ];
        let drops = DropCounters::default();
        let emitted = transform_batch(&cache, &cfg, Some(&meta), &samples, &HashMap::new(), &drops);
        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted[0].interval, Interval { start_ms: Some(2000), end_ms: 3000 });
        assert_eq!(emitted[0].value, PointValue::Double(2.5));
        assert_eq!(emitted[1].interval, Interval { start_ms: Some(2000), end_ms: 4000 });
        assert_eq!(emitted[2].interval, Interval { start_ms: Some(4999), end_ms: 5000 });
        assert_eq!(emitted[2].value, PointValue::Double(7.0));
    }

    fn untyped_md(name: &str) -> MetricMetadata {
        MetricMetadata { name: name.to_owned(), metric_type: MetricType::Untyped, help: String::new(), unit: String::new() }
    }

    #[test]
    fn untyped_first_sample_emits_gauge_only() {
        let cache = SeriesCache::new();
        let mut ids = HashMap::new();
        ids.insert(SeriesRef(3), LabelSet::from_pairs([("__name__".to_owned(), "u1".to_owned())]));
        cache.set_labels_by_ref(labels_for(&ids));
        let cfg = config();
        let meta = |name: &str| Some(untyped_md(name));
        let samples = vec![Sample { series_ref: SeriesRef(3), timestamp_ms: 1000, value: 4.0 }];
        let drops = DropCounters::default();
        let emitted = transform_batch(&cache, &cfg, Some(&meta), &samples, &HashMap::new(), &drops);
        assert_eq!(emitted.len(), 1);
    }

    #[test]
    fn untyped_second_sample_emits_gauge_and_companion() {
        let cache = SeriesCache::new();
        let mut ids = HashMap::new();
        ids.insert(SeriesRef(3), LabelSet::from_pairs([("__name__".to_owned(), "u1".to_owned())]));
        cache.set_labels_by_ref(labels_for(&ids));
        let cfg = config();
        let meta = |name: &str| Some(untyped_md(name));
        let samples = vec![
            Sample { series_ref: SeriesRef(3), timestamp_ms: 1000, value: 4.0 },
            Sample { series_ref: SeriesRef(3), timestamp_ms: 2000, value: 6.0 },
        ];
        let drops = DropCounters::default();
        let emitted = transform_batch(&cache, &cfg, Some(&meta), &samples, &HashMap::new(), &drops);
        assert_eq!(emitted.len(), 2);
        assert!(emitted[1].metric_type.ends_with(":counter"));
        assert_eq!(emitted[1].value, PointValue::Double(2.0));
    }

    #[test]
    fn histogram_family_assembly_matches_worked_example() {
        let cache = SeriesCache::new();
        let mut ids = HashMap::new();
        let base_labels = |name: &str, le: Option<&str>| {
            let mut pairs = vec![("__name__".to_owned(), name.to_owned())];
            if let Some(le) = le {
                pairs.push(("le".to_owned(), le.to_owned()));
            }
            LabelSet::from_pairs(pairs)
        };
        ids.insert(SeriesRef(100), base_labels("h_sum", None));
        ids.insert(SeriesRef(101), base_labels("h_count", None));
        ids.insert(SeriesRef(102), base_labels("h_bucket", Some("0.1")));
        ids.insert(SeriesRef(103), base_labels("h_bucket", Some("0.5")));
        ids.insert(SeriesRef(104), base_labels("h_bucket", Some("1")));
        ids.insert(SeriesRef(105), base_labels("h_bucket", Some("2.5")));
        ids.insert(SeriesRef(106), base_labels("h_bucket", Some("+Inf")));
        cache.set_labels_by_ref(labels_for(&ids));
        let cfg = config();
        let meta = |name: &str| Some(histogram_md(name));

        let first_set = vec![
            Sample { series_ref: SeriesRef(102), timestamp_ms: 1000, value: 2.0 },
            Sample { series_ref: SeriesRef(103), timestamp_ms: 1000, value: 5.0 },
            Sample { series_ref: SeriesRef(104), timestamp_ms: 1000, value: 6.0 },
            Sample { series_ref: SeriesRef(105), timestamp_ms: 1000, value: 8.0 },
            Sample { series_ref: SeriesRef(106), timestamp_ms: 1000, value: 10.0 },
            Sample { series_ref: SeriesRef(100), timestamp_ms: 1000, value: 55.1 },
            Sample { series_ref: SeriesRef(101), timestamp_ms: 1000, value: 10.0 },
        ];
        let drops = DropCounters::default();
        let emitted = transform_batch(&cache, &cfg, Some(&meta), &first_set, &HashMap::new(), &drops);
        assert!(emitted.is_empty(), "first sighting of every sibling seeds baselines only");

        let second_set = vec![
            Sample { series_ref: SeriesRef(102), timestamp_ms: 2000, value: 4.0 },
            Sample { series_ref: SeriesRef(103), timestamp_ms: 2000, value: 9.0 },
            Sample { series_ref: SeriesRef(104), timestamp_ms: 2000, value: 11.0 },
            Sample { series_ref: SeriesRef(105), timestamp_ms: 2000, value: 15.0 },
            Sample { series_ref: SeriesRef(106), timestamp_ms: 2000, value: 21.0 },
            Sample { series_ref: SeriesRef(100), timestamp_ms: 2000, value: 123.4 },
            Sample { series_ref: SeriesRef(101), timestamp_ms: 2000, value: 21.0 },
        ];
        let emitted = transform_batch(&cache, &cfg, Some(&meta), &second_set, &HashMap::new(), &drops);
        assert_eq!(emitted.len(), 1);
        let PointValue::Distribution(dist) = &emitted[0].value else { panic!("expected distribution") };
        assert_eq!(dist.bucket_bounds, vec![0.1, 0.5, 1.0, 2.5]);
        assert_eq!(dist.bucket_counts, vec![2, 2, 1, 2, 4]);
        assert_eq!(dist.count, 11);
        assert!((dist.mean - 6.2091).abs() < 1e-3);
        assert!((dist.sum_of_squared_deviation - 270.3016).abs() < 1e-2);
        assert_eq!(emitted[0].interval, Interval { start_ms: Some(1000), end_ms: 2000 });
    }

    #[test]
    fn histogram_with_only_infinite_bucket_is_dropped() {
        let cache = SeriesCache::new();
        let mut ids = HashMap::new();
        ids.insert(SeriesRef(200), LabelSet::from_pairs([("__name__".to_owned(), "h_count".to_owned())]));
        ids.insert(SeriesRef(201), LabelSet::from_pairs([("__name__".to_owned(), "h_bucket".to_owned()), ("le".to_owned(), "+Inf".to_owned())]));
        cache.set_labels_by_ref(labels_for(&ids));
        let cfg = config();
        let meta = |name: &str| Some(histogram_md(name));
        let drops = DropCounters::default();

        let baseline = vec![
            Sample { series_ref: SeriesRef(201), timestamp_ms: 1000, value: 1.0 },
            Sample { series_ref: SeriesRef(200), timestamp_ms: 1000, value: 1.0 },
        ];
        transform_batch(&cache, &cfg, Some(&meta), &baseline, &HashMap::new(), &drops);

        let next_set = vec![
            Sample { series_ref: SeriesRef(201), timestamp_ms: 2000, value: 3.0 },
            Sample { series_ref: SeriesRef(200), timestamp_ms: 2000, value: 3.0 },
        ];
        let emitted = transform_batch(&cache, &cfg, Some(&meta), &next_set, &HashMap::new(), &drops);
        assert!(emitted.is_empty());
        assert_eq!(drops.get(DropReason::ZeroBucketsBounds), 1);
    }

    #[test]
    fn summary_duplicate_count_sample_is_suppressed() {
        let cache = SeriesCache::new();
        let mut ids = HashMap::new();
        ids.insert(SeriesRef(9), LabelSet::from_pairs([("__name__".to_owned(), "s_count".to_owned())]));
        cache.set_labels_by_ref(labels_for(&ids));
        let cfg = config();
        let meta = |name: &str| {
            Some(MetricMetadata { name: name.to_owned(), metric_type: MetricType::Summary, help: String::new(), unit: String::new() })
        };
        let drops = DropCounters::default();
        let samples = vec![
            Sample { series_ref: SeriesRef(9), timestamp_ms: 1000, value: 3.0 },
            Sample { series_ref: SeriesRef(9), timestamp_ms: 1000, value: 3.0 },
        ];
        let emitted = transform_batch(&cache, &cfg, Some(&meta), &samples, &HashMap::new(), &drops);
        assert!(emitted.is_empty());
    }

    #[test]
    fn stale_marker_is_dropped() {
        let cache = SeriesCache::new();
        let cfg = config();
        let drops = DropCounters::default();
        let samples = vec![Sample { series_ref: SeriesRef(1), timestamp_ms: 1000, value: f64::from_bits(crate::types::STALE_NAN_BIT_PATTERN) }];
        let emitted = transform_batch(&cache, &cfg, None, &samples, &HashMap::new(), &drops);
        assert!(emitted.is_empty());
        assert_eq!(drops.get(DropReason::StalenessMarker), 1);
    }
}
