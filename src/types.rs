//! The wire-independent data model shared by every component of the core:
//! series references, label sets, metric metadata, and the target API's
//! point shapes (§3 of the design).

use std::collections::BTreeMap;

/// Opaque 64-bit identifier assigned by the producer's storage engine.
///
/// Stable for the lifetime of a series; the core never interprets the bits,
/// it only uses the value as a map key and as input to the injected
/// `labels_by_ref` callback.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesRef(pub u64);

/// The reserved IEEE-754 NaN bit pattern the producer uses to mark a
/// staleness marker. Not a language feature: a domain constant chosen by
/// the storage engine, reproduced here bit-exact.
pub const STALE_NAN_BIT_PATTERN: u64 = 0x7ff0_0000_0000_0002;

/// Returns whether `value`'s bit pattern is exactly the reserved stale marker.
#[must_use]
pub fn is_stale_marker(value: f64) -> bool {
    value.to_bits() == STALE_NAN_BIT_PATTERN
}

/// An ordered, deduplicated sequence of `(name, value)` pairs sorted by name.
///
/// Construction always sorts and de-duplicates (last write wins), so any
/// two `LabelSet`s built from the same pairs compare equal regardless of
/// input order.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelSet {
    pairs: Vec<(String, String)>,
}

impl LabelSet {
    /// Builds a label set from unordered pairs, sorting by name and
    /// dropping earlier duplicates in favor of later ones.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut map = BTreeMap::new();
        for (name, value) in pairs {
            map.insert(name, value);
        }
        Self { pairs: map.into_iter().collect() }
    }

    /// An empty label set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value for `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// The metric name, from the well-known `__name__` label.
    #[must_use]
    pub fn metric_name(&self) -> Option<&str> {
        self.get("__name__")
    }

    /// Iterates the pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy of this label set with `name` removed, if present.
    #[must_use]
    pub fn without(&self, name: &str) -> Self {
        Self { pairs: self.pairs.iter().filter(|(k, _)| k != name).cloned().collect() }
    }

    /// Tests whether two label sets match "modulo" a set of ignored label
    /// names — used by histogram-family assembly to compare siblings while
    /// ignoring `__name__` and `le` (§4.2.1 step 1b).
    #[must_use]
    pub fn matches_ignoring(&self, other: &Self, ignored: &[&str]) -> bool {
        let filter = |ls: &Self| -> Vec<(String, String)> {
            ls.pairs.iter().filter(|(k, _)| !ignored.contains(&k.as_str())).cloned().collect()
        };
        filter(self) == filter(other)
    }
}

/// The six well-known monitored-resource label slots (§3, §4.1).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ResourceLabels {
    /// Cloud project the series belongs to. Mandatory.
    pub project_id: String,
    /// Cloud region/location. Mandatory.
    pub location: String,
    /// Cluster name, if any.
    pub cluster: String,
    /// Namespace within the cluster, if any.
    pub namespace: String,
    /// Scrape job name.
    pub job: String,
    /// Scrape target instance.
    pub instance: String,
}

/// Prometheus metric type, as reported by metadata.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MetricType {
    Gauge,
    Counter,
    Untyped,
    Summary,
    Histogram,
}

/// Metadata about a metric family, resolved via the producer's
/// `metadata_fn` (§4.2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricMetadata {
    /// The metric family's name.
    pub name: String,
    /// The Prometheus type this family was declared as.
    pub metric_type: MetricType,
    /// Human-readable help text, if any.
    pub help: String,
    /// Declared unit, if any.
    pub unit: String,
}

/// Distinguishes histogram/summary family members by their Prometheus
/// metric-name suffix (§3 `CacheEntry.metricNameSuffix`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MetricNameSuffix {
    None,
    Sum,
    Count,
    Bucket,
}

/// The target API's metric kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Cumulative,
}

/// A single raw input sample, as produced by the write-ahead log reader.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    /// Which series this sample belongs to.
    pub series_ref: SeriesRef,
    /// Unix milliseconds.
    pub timestamp_ms: i64,
    /// The raw observed value, possibly the stale-marker bit pattern.
    pub value: f64,
}

/// An exemplar observation attached to a histogram bucket (§4.2.1 "Exemplars").
#[derive(Clone, Debug, PartialEq)]
pub struct Exemplar {
    /// Unix milliseconds the exemplar observation was recorded at.
    pub timestamp_ms: i64,
    /// The observed value.
    pub value: f64,
    /// The exemplar's own label set (e.g. `trace_id`, `span_id`).
    pub labels: LabelSet,
}

/// The typed value carried by a target point.
#[derive(Clone, Debug, PartialEq)]
pub enum PointValue {
    Double(f64),
    Distribution(DistributionValue),
}

/// A Cloud Monitoring-shaped distribution value: explicit bucket bounds
/// (finite bounds only — the final count entry covers `(lastBound, +Inf)`),
/// per-bucket counts, and the three scalar aggregates (§4.2.1 steps 6-8).
#[derive(Clone, Debug, PartialEq)]
pub struct DistributionValue {
    /// Total observation count across every bucket.
    pub count: u64,
    /// Mean of all observations.
    pub mean: f64,
    /// Sum of squared deviation from the mean across buckets.
    pub sum_of_squared_deviation: f64,
    /// Finite bucket upper bounds, ascending.
    pub bucket_bounds: Vec<f64>,
    /// Per-bucket counts; one more entry than `bucket_bounds` (the last
    /// entry covers `(lastBound, +Inf)`).
    pub bucket_counts: Vec<u64>,
    /// Exemplars attached to this distribution, if any.
    pub exemplars: Vec<PointExemplar>,
}

/// A wire-shaped exemplar attachment: either a span-context reference or a
/// bag of dropped labels, per §4.2.1's exemplar construction rule.
#[derive(Clone, Debug, PartialEq)]
pub enum PointExemplar {
    SpanContext { value: f64, span_name: String, dropped_labels: LabelSet },
    DroppedLabelsOnly { value: f64, dropped_labels: LabelSet },
}

/// The interval a point covers: `start` is `None` for gauges, `Some` for
/// cumulative points.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Interval {
    /// `None` for gauges; `Some` start for cumulative points.
    pub start_ms: Option<i64>,
    /// The point's own timestamp.
    pub end_ms: i64,
}

/// One fully-resolved target time series point, ready for shard assignment.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetPoint {
    /// The monitored resource this point belongs to.
    pub resource: ResourceLabels,
    /// The synthesized `"<prefix>/<name>/<kind>"` metric type string.
    pub metric_type: String,
    /// Labels identifying the metric within its resource.
    pub metric_labels: LabelSet,
    /// Gauge or cumulative.
    pub kind: MetricKind,
    /// The point's time interval.
    pub interval: Interval,
    /// The point's typed value.
    pub value: PointValue,
    /// The sharding hash used to pick this point's shard (§4.5).
    pub hash: u64,
}
