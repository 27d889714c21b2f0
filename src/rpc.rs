//! The outbound RPC transport (§6 "Outward (cloud API)"): a
//! `CreateTimeSeries`-shaped client built the way the teacher's push-gateway
//! task builds its outbound client (`hyper_util::client::legacy::Client`
//! over `hyper-rustls`, gzip-able body, bearer auth), but pointed at the
//! cloud monitoring API's `CreateTimeSeries` RPC instead of a Prometheus
//! push-gateway `PUT`.
//!
//! This module only speaks the wire shape; encoding a [`TargetPoint`] into
//! a [`TimeSeries`] is the transformer's job (§4.2), and deciding *when* to
//! call [`RpcClient::create_time_series`] is the batch's job (§4.4).
//!
//! `RpcClient` returns a boxed future rather than using `async-trait`,
//! matching the teacher's own `ExporterFuture` type alias
//! (`Pin<Box<dyn Future<Output = ...> + Send + 'static>>`) for type-erased
//! async work.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Method, Request, Uri};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::config::{Compression, RPC_DEADLINE};
use crate::types::{DistributionValue, Interval, MetricKind, PointExemplar, PointValue, TargetPoint};

/// Errors from a single `CreateTimeSeries` call (§7 "RPC failure"). Never
/// retried by the caller; the batch logs and drops (§4.4 `send`).
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request exceeded the {0:?} deadline")]
    Deadline(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote rejected the request: HTTP {0}")]
    RemoteRejected(u16),
}

/// A boxed, type-erased future, matching the teacher's `ExporterFuture`
/// idiom for async work behind a trait object.
pub type RpcFuture = Pin<Box<dyn Future<Output = Result<(), RpcError>> + Send>>;

/// Abstraction over "send this project's points somewhere", so the batch
/// and send-loop tests can substitute a fake without a real network.
pub trait RpcClient: Send + Sync {
    fn create_time_series(&self, project_id: String, series: Vec<TimeSeries>) -> RpcFuture;
}

/// A `CreateTimeSeries` request body (§6): `{name, timeSeries}`.
#[derive(Serialize)]
struct CreateTimeSeriesRequest {
    name: String,
    #[serde(rename = "timeSeries")]
    time_series: Vec<TimeSeries>,
}

/// One target time series (§6 "Outward"): typed monitored-resource
/// descriptor, metric descriptor, kind, and exactly one point.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimeSeries {
    /// The typed monitored-resource descriptor.
    pub resource: WireMonitoredResource,
    /// The metric descriptor (type string plus metric labels).
    pub metric: WireMetric,
    /// `"GAUGE"` or `"CUMULATIVE"`.
    pub metric_kind: &'static str,
    /// `"DOUBLE"` or `"DISTRIBUTION"`.
    pub value_type: &'static str,
    /// Exactly one point, per §6.
    pub points: [WirePoint; 1],
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WireMonitoredResource {
    /// The monitored-resource type (e.g. `"generic_task"`).
    #[serde(rename = "type")]
    pub resource_type: &'static str,
    /// The six resource-label slots, by name.
    pub labels: BTreeMap<&'static str, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WireMetric {
    /// The synthesized metric type string.
    #[serde(rename = "type")]
    pub metric_type: String,
    /// Labels identifying the metric within its resource.
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WirePoint {
    /// The point's time interval.
    pub interval: WireInterval,
    /// The point's typed value.
    pub value: WireTypedValue,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WireInterval {
    /// RFC 3339 start time; omitted for gauge points.
    #[serde(rename = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// RFC 3339 end time.
    #[serde(rename = "endTime")]
    pub end_time: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireTypedValue {
    Double { #[serde(rename = "doubleValue")] double_value: f64 },
    Distribution { #[serde(rename = "distributionValue")] distribution_value: WireDistribution },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WireDistribution {
    /// Total observation count, stringified per the target API's int64 convention.
    pub count: String,
    /// Mean of all observations.
    pub mean: f64,
    #[serde(rename = "sumOfSquaredDeviation")]
    /// Sum of squared deviation from the mean.
    pub sum_of_squared_deviation: f64,
    #[serde(rename = "bucketOptions")]
    /// The explicit bucket boundaries.
    pub bucket_options: WireBucketOptions,
    #[serde(rename = "bucketCounts")]
    /// Per-bucket counts, stringified.
    pub bucket_counts: Vec<String>,
    /// Attached exemplars, if any.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exemplars: Vec<WireExemplar>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WireBucketOptions {
    /// Explicit (non-exponential, non-linear) bucket boundaries.
    #[serde(rename = "explicitBuckets")]
    pub explicit_buckets: WireExplicitBuckets,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WireExplicitBuckets {
    /// Finite bucket upper bounds, ascending.
    pub bounds: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WireExemplar {
    /// The exemplar's observed value.
    pub value: f64,
    /// Span-context and/or dropped-label attachments.
    pub attachments: Vec<WireExemplarAttachment>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireExemplarAttachment {
    SpanContext { #[serde(rename = "spanContext")] span_context: String },
    DroppedLabels { labels: BTreeMap<String, String> },
}

/// Formats a millisecond Unix timestamp as RFC 3339 (`...Z`), with no
/// external date/time crate: the teacher's dependency stack has none, and
/// civil-calendar conversion from a day count is a handful of well-known
/// integer operations (Howard Hinnant's `civil_from_days`).
fn format_rfc3339_ms(timestamp_ms: i64) -> String {
    let total_ms = timestamp_ms.rem_euclid(1000);
    let days = timestamp_ms.div_euclid(86_400_000);
    let ms_of_day = timestamp_ms.rem_euclid(86_400_000);

    let (year, month, day) = civil_from_days(days);
    let hour = ms_of_day / 3_600_000;
    let minute = (ms_of_day / 60_000) % 60;
    let second = (ms_of_day / 1_000) % 60;

    format!(
        "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{total_ms:03}Z"
    )
}

/// Days-since-epoch to `(year, month, day)`, per Howard Hinnant's
/// `civil_from_days` algorithm (proleptic Gregorian calendar).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

/// Converts one resolved [`TargetPoint`] into its wire shape (§6).
#[must_use]
pub fn to_wire(point: &TargetPoint, resource_type: &'static str) -> TimeSeries {
    let Interval { start_ms, end_ms } = point.interval;
    let metric_kind = match point.kind {
        MetricKind::Gauge => "GAUGE",
        MetricKind::Cumulative => "CUMULATIVE",
    };

    let mut resource_labels = BTreeMap::new();
    resource_labels.insert("project_id", point.resource.project_id.clone());
    resource_labels.insert("location", point.resource.location.clone());
    resource_labels.insert("cluster", point.resource.cluster.clone());
    resource_labels.insert("namespace", point.resource.namespace.clone());
    resource_labels.insert("job", point.resource.job.clone());
    resource_labels.insert("instance", point.resource.instance.clone());

    let metric_labels = point.metric_labels.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();

    let (value_type, wire_value) = match &point.value {
        PointValue::Double(v) => ("DOUBLE", WireTypedValue::Double { double_value: *v }),
        PointValue::Distribution(d) => {
            ("DISTRIBUTION", WireTypedValue::Distribution { distribution_value: to_wire_distribution(d) })
        }
    };

    TimeSeries {
        resource: WireMonitoredResource { resource_type, labels: resource_labels },
        metric: WireMetric { metric_type: point.metric_type.clone(), labels: metric_labels },
        metric_kind,
        value_type,
        points: [WirePoint {
            interval: WireInterval { start_time: start_ms.map(format_rfc3339_ms), end_time: format_rfc3339_ms(end_ms) },
            value: wire_value,
        }],
    }
}

fn to_wire_distribution(d: &DistributionValue) -> WireDistribution {
    WireDistribution {
        count: d.count.to_string(),
        mean: d.mean,
        sum_of_squared_deviation: d.sum_of_squared_deviation,
        bucket_options: WireBucketOptions { explicit_buckets: WireExplicitBuckets { bounds: d.bucket_bounds.clone() } },
        bucket_counts: d.bucket_counts.iter().map(ToString::to_string).collect(),
        exemplars: d.exemplars.iter().map(to_wire_exemplar).collect(),
    }
}

fn to_wire_exemplar(exemplar: &PointExemplar) -> WireExemplar {
    match exemplar {
        PointExemplar::SpanContext { value, span_name, dropped_labels } => {
            let mut attachments = vec![WireExemplarAttachment::SpanContext { span_context: span_name.clone() }];
            if dropped_labels.iter().next().is_some() {
                attachments.push(WireExemplarAttachment::DroppedLabels {
                    labels: dropped_labels.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect(),
                });
            }
            WireExemplar { value: *value, attachments }
        }
        PointExemplar::DroppedLabelsOnly { value, dropped_labels } => WireExemplar {
            value: *value,
            attachments: vec![WireExemplarAttachment::DroppedLabels {
                labels: dropped_labels.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect(),
            }],
        },
    }
}

type HttpsClient = Client<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>, Full<Bytes>>;

/// The real `hyper`-backed client, constructed the same way the teacher's
/// push-gateway task builds its client: native-roots TLS, HTTP/1, a pooled
/// `hyper_util::client::legacy::Client`.
pub struct HyperRpcClient {
    client: HttpsClient,
    endpoint: Uri,
    compression: Compression,
    bearer_token: Option<String>,
    user_agent: String,
}

impl HyperRpcClient {
    /// Builds a client against `endpoint` (§6 `endpoint` option).
    pub fn new(endpoint: Uri, compression: Compression, bearer_token: Option<String>, user_agent_suffix: Option<&str>) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .expect("no native root CA certificates found")
            .https_or_http()
            .enable_http1()
            .build();
        let client: HttpsClient =
            Client::builder(TokioExecutor::new()).pool_idle_timeout(Duration::from_secs(30)).build(https);

        let mut user_agent = "cloud-metrics-export-core/1".to_owned();
        if let Some(suffix) = user_agent_suffix {
            user_agent.push(' ');
            user_agent.push_str(suffix);
        }

        Self { client, endpoint, compression, bearer_token, user_agent }
    }

    fn project_uri(&self, project_id: &str) -> Uri {
        format!("{}v3/projects/{project_id}/timeSeries", self.endpoint)
            .parse()
            .unwrap_or_else(|_| self.endpoint.clone())
    }
}

impl RpcClient for HyperRpcClient {
    fn create_time_series(&self, project_id: String, series: Vec<TimeSeries>) -> RpcFuture {
        // `self` outlives every in-flight call: the exporter owns it behind
        // an `Arc` (§4.5), so we only need to clone the small pieces of
        // state this future actually touches rather than borrow `self`.
        let client = self.client.clone();
        let endpoint = self.project_uri(&project_id);
        let compression = self.compression;
        let bearer_token = self.bearer_token.clone();
        let user_agent = self.user_agent.clone();

        Box::pin(async move {
            let body = CreateTimeSeriesRequest { name: format!("projects/{project_id}"), time_series: series };
            let mut json = serde_json::to_vec(&body).map_err(|e| RpcError::Transport(e.to_string()))?;
            if matches!(compression, Compression::Gzip) {
                json = gzip_compress(&json);
            }

            let mut builder = Request::builder()
                .method(Method::POST)
                .uri(endpoint)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::USER_AGENT, user_agent);
            if matches!(compression, Compression::Gzip) {
                builder = builder.header(header::CONTENT_ENCODING, "gzip");
            }
            if let Some(token) = bearer_token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }

            let request = builder.body(Full::from(Bytes::from(json))).map_err(|e| RpcError::Transport(e.to_string()))?;

            let response = tokio::time::timeout(RPC_DEADLINE, client.request(request))
                .await
                .map_err(|_| RpcError::Deadline(RPC_DEADLINE))?
                .map_err(|e| RpcError::Transport(e.to_string()))?;

            if !response.status().is_success() {
                return Err(RpcError::RemoteRejected(response.status().as_u16()));
            }
            Ok(())
        })
    }
}

#[cfg(feature = "gzip")]
fn gzip_compress(body: &[u8]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression as GzCompression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), GzCompression::default());
    if let Err(e) = encoder.write_all(body) {
        error!(error = %e, "rpc: failed to gzip-compress request body, sending uncompressed");
        return body.to_vec();
    }
    encoder.finish().unwrap_or_else(|_| body.to_vec())
}

#[cfg(not(feature = "gzip"))]
fn gzip_compress(body: &[u8]) -> Vec<u8> {
    body.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LabelSet, ResourceLabels};

    #[test]
    fn gauge_point_has_no_start_time() {
        let point = TargetPoint {
            resource: ResourceLabels { project_id: "p".into(), location: "l".into(), ..Default::default() },
            metric_type: "custom.googleapis.com/m/gauge".into(),
            metric_labels: LabelSet::new(),
            kind: MetricKind::Gauge,
            interval: Interval { start_ms: None, end_ms: 4_000 },
            value: PointValue::Double(0.6),
            hash: 0,
        };
        let wire = to_wire(&point, "generic_task");
        assert!(wire.points[0].interval.start_time.is_none());
        assert_eq!(wire.metric_kind, "GAUGE");
    }

    #[test]
    fn cumulative_point_has_start_time() {
        let point = TargetPoint {
            resource: ResourceLabels { project_id: "p".into(), location: "l".into(), ..Default::default() },
            metric_type: "custom.googleapis.com/m/counter".into(),
            metric_labels: LabelSet::new(),
            kind: MetricKind::Cumulative,
            interval: Interval { start_ms: Some(2_000), end_ms: 3_000 },
            value: PointValue::Double(2.5),
            hash: 0,
        };
        let wire = to_wire(&point, "generic_task");
        assert_eq!(wire.points[0].interval.start_time, Some(format_rfc3339_ms(2_000)));
        assert_eq!(wire.metric_kind, "CUMULATIVE");
    }

    #[test]
    fn rfc3339_epoch_boundary() {
        assert_eq!(format_rfc3339_ms(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_rfc3339_ms(1_000), "1970-01-01T00:00:01.000Z");
    }
}
