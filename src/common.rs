//! Shared small types: series selectors, error enums, and drop-reason
//! labels for self-telemetry. Grounded in the teacher's `common.rs`
//! (`Matcher`, `BuildError`).

use thiserror::Error;

use crate::types::LabelSet;

/// Matches a series in a specific way, used for the configured
/// series-selector set (§4.1, §6 `matchers`).
///
/// Shaped after the teacher's `Matcher`, generalized from "matches a
/// metric name" to "matches a rendered label set", since a monitoring-API
/// series selector is closer to a full label matcher than a bare name
/// matcher.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Matcher {
    /// Matches the entire metric name.
    Full(String),
    /// Matches the beginning of the metric name.
    Prefix(String),
    /// Matches the end of the metric name.
    Suffix(String),
    /// Matches if the given label is present with the given value.
    LabelEquals(String, String),
}

impl Matcher {
    /// Checks whether `labels` is accepted by this matcher.
    #[must_use]
    pub fn matches(&self, labels: &LabelSet) -> bool {
        match self {
            Matcher::Full(full) => labels.metric_name() == Some(full.as_str()),
            Matcher::Prefix(prefix) => {
                labels.metric_name().is_some_and(|name| name.starts_with(prefix.as_str()))
            }
            Matcher::Suffix(suffix) => {
                labels.metric_name().is_some_and(|name| name.ends_with(suffix.as_str()))
            }
            Matcher::LabelEquals(name, value) => labels.get(name) == Some(value.as_str()),
        }
    }
}

/// Errors that can occur while building an [`crate::config::ExporterConfig`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// The push endpoint could not be parsed as a valid URI.
    #[error("export endpoint is not a valid URI: {0}")]
    InvalidEndpoint(String),

    /// `batch_size` exceeded the remote API's documented per-request ceiling.
    #[error("batch size {0} exceeds the maximum of {1}")]
    BatchSizeTooLarge(usize, usize),

    /// `shard_count` was zero.
    #[error("shard count must be non-zero")]
    ZeroShardCount,
}

/// Errors surfaced from [`crate::exporter::Exporter::apply_config`] (§7
/// "Configuration errors").
///
/// Unlike per-sample drop reasons, a `ConfigError` means the exporter
/// refuses to run at all until the caller fixes the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither the series' own labels, the explicit config, nor the
    /// external labels supplied a `project_id`.
    #[error("resource label `project_id` could not be resolved from series labels, config, or external labels")]
    MissingProjectId,

    /// As above, for `location`.
    #[error("resource label `location` could not be resolved from series labels, config, or external labels")]
    MissingLocation,
}

/// Why a sample, or an entire histogram family, was dropped instead of
/// emitted. Used purely as a counter label (§4.5 "Self-telemetry", §7).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DropReason {
    StalenessMarker,
    NoCacheSeriesFound,
    MalformedBucketLeLabel,
    ZeroHistogramSamplesProcessed,
    NegativeBucketCount,
    ZeroCountViolation,
    ZeroBucketsBounds,
    NotInHaRange,
    ShardOverflow,
}

impl DropReason {
    /// The label value used on the self-telemetry counter.
    #[must_use]
    pub fn as_label(self) -> &'static str {
        match self {
            DropReason::StalenessMarker => "staleness_marker",
            DropReason::NoCacheSeriesFound => "no_cache_series_found",
            DropReason::MalformedBucketLeLabel => "malformed_bucket_le_label",
            DropReason::ZeroHistogramSamplesProcessed => "zero_histogram_samples_processed",
            DropReason::NegativeBucketCount => "negative_bucket_count",
            DropReason::ZeroCountViolation => "zero_count_violation",
            DropReason::ZeroBucketsBounds => "zero_buckets_bounds",
            DropReason::NotInHaRange => "not_in_ha_range",
            DropReason::ShardOverflow => "shard_overflow",
        }
    }
}
