//! Exporter configuration (§6 "Configuration options") and the builder
//! that constructs it, shaped after the teacher's `PrometheusBuilder`
//! chained-setter idiom (`exporter/builder.rs`).

use std::time::Duration;

use indexmap::IndexMap;

use crate::common::{BuildError, Matcher};

/// Compression applied to the outbound RPC body.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
}

/// The maximum `batch_size` the remote API accepts per project, per
/// request (§6).
pub const MAX_BATCH_SIZE: usize = 200;

/// Default shard count (§4.5 "State").
pub const DEFAULT_SHARD_COUNT: usize = 1024;

/// Default per-shard ring capacity (§4.3).
pub const DEFAULT_SHARD_BUFFER_SIZE: usize = 2048;

/// Default batch flush timer (§4.5 "Send loop").
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Default series-cache GC sweep interval (§5 "Memory").
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Default series-cache refresh-if-idle interval (§4.1 "CacheEntry lifecycle").
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Per-request RPC deadline (§4.4 `send`, §5 "Cancellation & timeouts").
pub const RPC_DEADLINE: Duration = Duration::from_secs(30);

/// Resolved exporter configuration, produced by [`ExporterConfigBuilder::build`].
#[derive(Clone, Debug)]
pub struct ExporterConfig {
    /// Makes `Export` a no-op.
    pub disabled: bool,
    /// RPC target host:port.
    pub endpoint: String,
    /// Outbound request body compression.
    pub compression: Compression,
    /// Path to a credentials file used for authentication, if any.
    pub credentials_file: Option<String>,
    /// Skip authentication entirely.
    pub disable_auth: bool,
    /// Default `project_id` resource-label filler.
    pub project_id: Option<String>,
    /// Default `location` resource-label filler.
    pub location: Option<String>,
    /// Default `cluster` resource-label filler.
    pub cluster: Option<String>,
    /// Series selectors; an empty list accepts every series.
    pub matchers: Vec<Matcher>,
    /// Per-project batch ceiling (`<= MAX_BATCH_SIZE`).
    pub batch_size: usize,
    /// Namespace component of synthesized metric type strings.
    pub metric_type_prefix: String,
    /// Number of shards.
    pub shard_count: usize,
    /// Per-shard ring capacity.
    pub shard_buffer_size: usize,
    /// Suffix appended to the outbound user-agent header, if any.
    pub user_agent_suffix: Option<String>,
    /// Resource labels supplied by the producer's own configuration
    /// (§4.1 "Resource-label precedence", tier 3).
    pub external_labels: IndexMap<String, String>,
}

/// Builder for [`ExporterConfig`], following the teacher's
/// `PrometheusBuilder` chained-setter shape (`exporter/builder.rs`):
/// infallible setters return `Self`, fallible ones return
/// `Result<Self, BuildError>`.
#[derive(Clone, Debug)]
pub struct ExporterConfigBuilder {
    disabled: bool,
    endpoint: String,
    compression: Compression,
    credentials_file: Option<String>,
    disable_auth: bool,
    project_id: Option<String>,
    location: Option<String>,
    cluster: Option<String>,
    matchers: Vec<Matcher>,
    batch_size: usize,
    metric_type_prefix: String,
    shard_count: usize,
    shard_buffer_size: usize,
    user_agent_suffix: Option<String>,
    external_labels: IndexMap<String, String>,
}

impl Default for ExporterConfigBuilder {
    fn default() -> Self {
        Self {
            disabled: false,
            endpoint: "https://monitoring.googleapis.com".to_owned(),
            compression: Compression::None,
            credentials_file: None,
            disable_auth: false,
            project_id: None,
            location: None,
            cluster: None,
            matchers: Vec::new(),
            batch_size: MAX_BATCH_SIZE,
            metric_type_prefix: "custom.googleapis.com".to_owned(),
            shard_count: DEFAULT_SHARD_COUNT,
            shard_buffer_size: DEFAULT_SHARD_BUFFER_SIZE,
            user_agent_suffix: None,
            external_labels: IndexMap::new(),
        }
    }
}

impl ExporterConfigBuilder {
    /// Creates a new builder with the documented defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `Export` a no-op (§6 `disabled`).
    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Sets the RPC target (§6 `endpoint`).
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets request compression (§6 `compression`).
    #[must_use]
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the credentials file path used for authentication (§6
    /// `credentialsFile`).
    #[must_use]
    pub fn credentials_file(mut self, path: impl Into<String>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    /// Disables authentication entirely (§6 `disableAuth`).
    #[must_use]
    pub fn disable_auth(mut self, disable: bool) -> Self {
        self.disable_auth = disable;
        self
    }

    /// Sets the default `project_id` resource-label filler (§6 `projectID`).
    #[must_use]
    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Sets the default `location` resource-label filler (§6 `location`).
    #[must_use]
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the default `cluster` resource-label filler (§6 `cluster`).
    #[must_use]
    pub fn cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Appends a series selector; an empty matcher list accepts all series
    /// (§6 `matchers`).
    #[must_use]
    pub fn add_matcher(mut self, matcher: Matcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Sets external labels supplied by the producer's own configuration
    /// (§4.1 "Resource-label precedence", tier 3).
    #[must_use]
    pub fn external_labels(mut self, labels: IndexMap<String, String>) -> Self {
        self.external_labels = labels;
        self
    }

    /// Sets the per-project batch ceiling (§6 `batchSize`, `≤ 200`).
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::BatchSizeTooLarge`] if `size` exceeds
    /// [`MAX_BATCH_SIZE`].
    pub fn batch_size(mut self, size: usize) -> Result<Self, BuildError> {
        if size > MAX_BATCH_SIZE {
            return Err(BuildError::BatchSizeTooLarge(size, MAX_BATCH_SIZE));
        }
        self.batch_size = size;
        Ok(self)
    }

    /// Sets the metric-type namespace prefix (§6 `metricTypePrefix`).
    #[must_use]
    pub fn metric_type_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metric_type_prefix = prefix.into();
        self
    }

    /// Sets the shard count (§6 `shardCount`; a power of two is recommended
    /// so `hash mod N` distributes evenly, but any non-zero value works).
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ZeroShardCount`] if `count` is zero.
    pub fn shard_count(mut self, count: usize) -> Result<Self, BuildError> {
        if count == 0 {
            return Err(BuildError::ZeroShardCount);
        }
        self.shard_count = count;
        Ok(self)
    }

    /// Sets the per-shard ring capacity (§6 `shardBufferSize`).
    #[must_use]
    pub fn shard_buffer_size(mut self, size: usize) -> Self {
        self.shard_buffer_size = size;
        self
    }

    /// Appends a suffix to the outbound user-agent header (§6 `userAgent`).
    #[must_use]
    pub fn user_agent_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.user_agent_suffix = Some(suffix.into());
        self
    }

    /// Validates the endpoint URI and produces the resolved [`ExporterConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidEndpoint`] if the configured endpoint
    /// cannot be parsed as a URI.
    pub fn build(self) -> Result<ExporterConfig, BuildError> {
        hyper::Uri::try_from(self.endpoint.as_str())
            .map_err(|e| BuildError::InvalidEndpoint(e.to_string()))?;

        Ok(ExporterConfig {
            disabled: self.disabled,
            endpoint: self.endpoint,
            compression: self.compression,
            credentials_file: self.credentials_file,
            disable_auth: self.disable_auth,
            project_id: self.project_id,
            location: self.location,
            cluster: self.cluster,
            matchers: self.matchers,
            batch_size: self.batch_size,
            metric_type_prefix: self.metric_type_prefix,
            shard_count: self.shard_count,
            shard_buffer_size: self.shard_buffer_size,
            user_agent_suffix: self.user_agent_suffix,
            external_labels: self.external_labels,
        })
    }
}
