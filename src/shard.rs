//! The shard queue (§4.3): a fixed-capacity ring buffer of `(hash, point)`
//! entries plus the `pending` flag that guarantees at-most-one in-flight
//! request per shard, which is how the core preserves per-series write
//! ordering at the remote API (§5 "Ordering guarantees").

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::batch::Batch;
use crate::types::TargetPoint;

/// One `(hash, point)` entry waiting to be batched.
#[derive(Clone, Debug)]
struct Entry {
    hash: u64,
    point: TargetPoint,
}

struct ShardState {
    /// A fixed-capacity ring (§3 `ShardQueue`): pushes past `capacity` are
    /// rejected rather than growing the deque, which is how the caller
    /// implements tail-drop.
    ring: VecDeque<Entry>,
    capacity: usize,
    /// "An in-flight batch contains at least one entry from this shard."
    /// While set, `fill` refuses to drain this shard (§3, §4.3).
    pending: bool,
}

/// One shard: an independently-locked ring buffer plus the `pending` flag
/// (§4.3). Shards never lock each other, so shard operations never
/// deadlock (§5 "Shared-resource policy").
pub struct Shard {
    state: Mutex<ShardState>,
}

/// Outcome of [`Shard::enqueue`]: whether the entry was accepted, used to
/// drive the `shard_overflow` drop counter at the call site.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EnqueueOutcome {
    Accepted,
    Overflow,
}

impl Shard {
    /// Creates an empty shard with the given ring capacity
    /// (`shardBufferSize`, §6).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ShardState { ring: VecDeque::with_capacity(capacity), capacity, pending: false }),
        }
    }

    /// Enqueues one point, never blocking longer than the time to hold the
    /// shard's own mutex (§5 "Suspension points").
    pub fn enqueue(&self, hash: u64, point: TargetPoint) -> EnqueueOutcome {
        let mut state = self.state.lock();
        if state.ring.len() == state.capacity {
            return EnqueueOutcome::Overflow;
        }
        state.ring.push_back(Entry { hash, point });
        EnqueueOutcome::Accepted
    }

    /// Drains entries into `batch` until the batch is full, a duplicate
    /// series-hash is seen within this pass, or the queue empties (§4.3
    /// `fill`). Returns the number of entries taken.
    ///
    /// Returns `0` immediately, without touching the ring, if this shard
    /// already has an in-flight batch (`pending`); on taking at least one
    /// entry, sets `pending = true` so no further samples from this shard
    /// join any other batch until [`Shard::notify_done`].
    pub fn fill(&self, batch: &mut Batch) -> usize {
        let mut state = self.state.lock();
        if state.pending {
            return 0;
        }

        let mut seen = HashSet::new();
        let mut taken = 0usize;
        loop {
            if batch.full() {
                break;
            }
            let Some(entry) = state.ring.front() else { break };
            if seen.contains(&entry.hash) {
                break;
            }
            let entry = state.ring.pop_front().expect("just peeked");
            seen.insert(entry.hash);
            batch.add(entry.point);
            taken += 1;
        }

        if taken > 0 {
            state.pending = true;
        }
        taken
    }

    /// Clears the in-flight flag after a batch containing this shard's
    /// contribution has finished sending (§4.3 `notifyDone`).
    ///
    /// Panics if `pending` was already `false`: that is an invariant
    /// violation (§7 "Invariant violations") indicating a shard was
    /// double-notified or notified without ever being filled.
    pub fn notify_done(&self) {
        let mut state = self.state.lock();
        assert!(state.pending, "shard notify_done called while not pending");
        state.pending = false;
    }

    /// Number of entries currently queued (telemetry / `fill` re-signal
    /// decision in the send loop, §4.5).
    pub fn len(&self) -> usize {
        self.state.lock().ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
