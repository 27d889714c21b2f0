//! Core transform/batch/send pipeline for exporting Prometheus-shaped
//! samples to a cloud monitoring API's `CreateTimeSeries` RPC.
//!
//! ## Basics
//!
//! This crate covers the part of a metrics-forwarding pipeline between "a
//! write-ahead log reader hands us raw samples" and "bytes are on the
//! wire": resolving opaque series references into enriched descriptors
//! with reset baselines ([`series_cache`]), converting Prometheus's data
//! model into the remote API's typed point model — including
//! counter-reset detection and histogram-family assembly — ([`transformer`]),
//! queueing per-series writes with an at-most-one-in-flight-per-shard
//! guarantee ([`shard`]), accumulating per-destination-project batches
//! ([`batch`]), and gating export by an HA lease's held timestamp range
//! while fanning out one RPC per project ([`exporter`]).
//!
//! Target discovery, scraping, and the RPC transport's own authentication
//! are out of scope: this crate consumes already-decoded samples and a
//! caller-supplied [`RpcClient`].
//!
//! ## Usage
//!
//! ```ignore
//! let config = ExporterConfigBuilder::new()
//!     .project_id("my-project")
//!     .location("us-central1")
//!     .build()?;
//! let lease = AlwaysHeldLease::new();
//! let rpc_client = Arc::new(HyperRpcClient::new(endpoint, Compression::Gzip, Some(token), None));
//! let exporter = Exporter::new(config, lease.clone(), rpc_client, "generic_task");
//! exporter.set_labels_by_ref(|series_ref| lookup_label_set(series_ref));
//!
//! let (canceller, cancel) = CancelSignal::channel();
//! tokio::spawn(exporter.clone().run(cancel.clone()));
//! tokio::spawn(exporter.clone().garbage_collect_loop(cancel.clone()));
//! tokio::spawn(lease.run(cancel));
//!
//! exporter.export(Some(&metadata_fn), &samples, &exemplars_by_ref);
//! ```
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod common;
pub use self::common::{BuildError, ConfigError, DropReason, Matcher};

mod config;
pub use self::config::{
    Compression, ExporterConfig, ExporterConfigBuilder, DEFAULT_FLUSH_INTERVAL, DEFAULT_GC_INTERVAL,
    DEFAULT_REFRESH_INTERVAL, DEFAULT_SHARD_BUFFER_SIZE, DEFAULT_SHARD_COUNT, MAX_BATCH_SIZE, RPC_DEADLINE,
};

pub mod formatting;

mod hash;
pub use self::hash::rapidhash_label_set;

mod types;
pub use self::types::{
    is_stale_marker, DistributionValue, Exemplar, Interval, LabelSet, MetricKind, MetricMetadata, MetricNameSuffix,
    MetricType, PointExemplar, PointValue, ResourceLabels, Sample, SeriesRef, TargetPoint,
};

mod series_cache;
pub use self::series_cache::{CacheEntry, GetResult, ResetAdjusted, SeriesCache};

mod shard;
pub use self::shard::{EnqueueOutcome, Shard};

mod batch;
pub use self::batch::Batch;

mod lease;
pub use self::lease::{AlwaysHeldLease, ControllableLease, LeaderChangeCallback, Lease, LeaseRange};

mod rpc;
pub use self::rpc::{HyperRpcClient, RpcClient, RpcError, RpcFuture, TimeSeries};

mod transformer;
pub use self::transformer::{transform_batch, DropCounters, MetadataResolver};

pub mod exporter;
pub use self::exporter::{install, try_get, CancelSignal, Canceller, Exporter};
