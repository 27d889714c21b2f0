//! Metric-name sanitization and metric-type string synthesis (§4.1
//! "Metric-type string synthesis"). Sanitization is kept from the
//! teacher's `formatting.rs`; it applies just as well to a metric type
//! string as to a Prometheus exposition-format name, since both are
//! built from the same Prometheus metric name.

use crate::types::MetricKind;

/// Sanitizes a metric name the same way Prometheus's own text exposition
/// format requires: first character `[a-zA-Z_:]`, subsequent characters
/// `[a-zA-Z0-9_:]`, everything else replaced with `_`.
#[must_use]
pub fn sanitize_metric_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut is_invalid: fn(char) -> bool = invalid_metric_name_start_character;
    for c in name.chars() {
        if is_invalid(c) {
            out.push('_');
        } else {
            out.push(c);
        }
        is_invalid = invalid_metric_name_character;
    }
    out
}

fn invalid_metric_name_start_character(c: char) -> bool {
    !(c.is_ascii_alphabetic() || c == '_' || c == ':')
}

fn invalid_metric_name_character(c: char) -> bool {
    !(c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// The metric-kind suffix that appears in a synthesized metric type string,
/// per §4.1: `gauge`, `counter`, `histogram`, `summary`, `unknown`,
/// `unknown:counter`, `summary:counter`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KindSuffix {
    Gauge,
    Counter,
    Histogram,
    Summary,
    Unknown,
    UnknownCounter,
    SummaryCounter,
}

impl KindSuffix {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            KindSuffix::Gauge => "gauge",
            KindSuffix::Counter => "counter",
            KindSuffix::Histogram => "histogram",
            KindSuffix::Summary => "summary",
            KindSuffix::Unknown => "unknown",
            KindSuffix::UnknownCounter => "unknown:counter",
            KindSuffix::SummaryCounter => "summary:counter",
        }
    }

    /// The [`MetricKind`] implied by this suffix — every `:counter`
    /// variant, plus the bare `counter` and `histogram`/`summary` count
    /// forms, are cumulative; everything else is a gauge.
    #[must_use]
    pub fn metric_kind(self) -> MetricKind {
        match self {
            KindSuffix::Gauge | KindSuffix::Unknown | KindSuffix::Summary => MetricKind::Gauge,
            KindSuffix::Counter
            | KindSuffix::Histogram
            | KindSuffix::UnknownCounter
            | KindSuffix::SummaryCounter => MetricKind::Cumulative,
        }
    }

    /// The cumulative companion kind synthesized alongside the gauge form
    /// for untyped and summary-sum series (§4.1 "the `:counter` variants
    /// designate the cumulative companion emitted alongside the gauge
    /// form"). Only ever called on `Unknown`/`Summary`, the two kinds that
    /// have a documented companion.
    #[must_use]
    pub fn counter_companion(self) -> KindSuffix {
        match self {
            KindSuffix::Unknown => KindSuffix::UnknownCounter,
            KindSuffix::Summary => KindSuffix::SummaryCounter,
            other => other,
        }
    }
}

/// Synthesizes `"<type_prefix>/<metric_name>/<kind_suffix>"` (§4.1),
/// sanitizing `metric_name` the same way Prometheus's own exposition
/// format requires.
#[must_use]
pub fn synthesize_metric_type(type_prefix: &str, metric_name: &str, kind: KindSuffix) -> String {
    format!("{}/{}/{}", type_prefix.trim_end_matches('/'), sanitize_metric_name(metric_name), kind.as_str())
}
