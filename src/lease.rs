//! The lease contract (§4.5 "Lease integration", §9 "Lease abstraction").
//!
//! The lease provider itself — Kubernetes-lease-based HA coordination, or
//! trivial always-held single-replica mode — is out of scope (§1); this
//! module specifies only the narrow capability set the exporter consumes:
//! `Range`, `Run`, `OnLeaderChange`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;

/// The currently held timestamp range, or `held = false` if this replica
/// does not currently hold the lease (§3, §4.5 `Range`).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LeaseRange {
    /// Start of the held range, inclusive.
    pub start_ms: i64,
    /// End of the held range, inclusive.
    pub end_ms: i64,
    /// Whether this replica currently holds the lease at all.
    pub held: bool,
}

impl LeaseRange {
    /// The always-held, unbounded range used by [`AlwaysHeldLease`].
    #[must_use]
    pub const fn unbounded() -> Self {
        Self { start_ms: i64::MIN, end_ms: i64::MAX, held: true }
    }

    /// Whether `timestamp_ms` falls within `[start_ms, end_ms]` while the
    /// lease is held (§4.5 Export path step 4).
    #[must_use]
    pub fn covers(&self, timestamp_ms: i64) -> bool {
        self.held && timestamp_ms >= self.start_ms && timestamp_ms <= self.end_ms
    }
}

/// A callback invoked when the lease transitions leadership state
/// (acquired or lost). The exporter registers `seriesCache.clear` here
/// (§4.5).
pub type LeaderChangeCallback = Box<dyn Fn() + Send + Sync>;

/// The capability set the exporter consumes from a lease implementation
/// (§9 "Lease abstraction"): `Range`, `Run`, `OnLeaderChange`. Two variants
/// are required: [`AlwaysHeldLease`] for single-replica mode, and an
/// external-coordination implementation for HA mode (supplied by the host
/// process; only the trait is specified here, per §1's scope boundary).
pub trait Lease: Send + Sync {
    /// The currently held `(start, end, held)` triple.
    fn range(&self) -> LeaseRange;

    /// Registers a callback fired on every leadership transition. May be
    /// called at most once; a lease implementation that only supports a
    /// single subscriber should treat a second call as a logic error in
    /// the caller, the same way [`crate::series_cache::SeriesCache::set_labels_by_ref`]
    /// does for its own single-subscriber callback.
    fn on_leader_change(&self, callback: LeaderChangeCallback);

    /// Runs the lease's background coordination task until `ctx` is
    /// cancelled. For [`AlwaysHeldLease`] this resolves only when
    /// cancelled.
    fn run(self: Arc<Self>, cancel: crate::exporter::CancelSignal) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Single-replica mode: always holds an unbounded range, never changes
/// leadership, and its `run` future simply waits for cancellation (§9).
pub struct AlwaysHeldLease;

impl AlwaysHeldLease {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl Default for AlwaysHeldLease {
    fn default() -> Self {
        Self
    }
}

impl Lease for AlwaysHeldLease {
    fn range(&self) -> LeaseRange {
        LeaseRange::unbounded()
    }

    fn on_leader_change(&self, _callback: LeaderChangeCallback) {
        // Never fires: this replica never loses leadership.
    }

    fn run(self: Arc<Self>, cancel: crate::exporter::CancelSignal) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move { cancel.cancelled().await })
    }
}

/// A lease whose held range and leadership can be driven by a test or by
/// an external HA coordination implementation (e.g. a Kubernetes lease
/// watcher). Held state and the registered callback live behind a single
/// `RwLock`, mirroring how the rest of the core favors one lock per
/// logically-single piece of shared state over finer-grained locking
/// (§5 "Shared-resource policy").
pub struct ControllableLease {
    state: RwLock<LeaseRange>,
    callback: RwLock<Option<LeaderChangeCallback>>,
}

impl ControllableLease {
    #[must_use]
    pub fn new(initial: LeaseRange) -> Arc<Self> {
        Arc::new(Self { state: RwLock::new(initial), callback: RwLock::new(None) })
    }

    /// Updates the held range and, if leadership (the `held` bit) changed,
    /// fires the registered callback (§4.5 `OnLeaderChange`).
    pub fn set_range(&self, range: LeaseRange) {
        let previous_held = self.state.read().held;
        *self.state.write() = range;
        if previous_held != range.held {
            if let Some(callback) = self.callback.read().as_ref() {
                callback();
            }
        }
    }
}

impl Lease for ControllableLease {
    fn range(&self) -> LeaseRange {
        *self.state.read()
    }

    fn on_leader_change(&self, callback: LeaderChangeCallback) {
        *self.callback.write() = Some(callback);
    }

    fn run(self: Arc<Self>, cancel: crate::exporter::CancelSignal) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move { cancel.cancelled().await })
    }
}
