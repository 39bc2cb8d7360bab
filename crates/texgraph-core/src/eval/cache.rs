//! Version-guarded per-node result cache shared by all evaluation passes.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::buffer::SharedImage;
use crate::graph::NodeId;

/// What an input socket read when its node was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStamp {
    /// The socket default.
    Default,
    /// An upstream output, identified by the stamp of the slot it came from.
    Linked {
        node: NodeId,
        socket: usize,
        stamp: u64,
    },
}

/// Why a node has no usable output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeFailure {
    /// The operator itself returned an error.
    Operator { message: String },
    /// An input depends on a failed node; the operator was not run.
    Upstream { origin: NodeId },
}

#[derive(Debug, Clone)]
pub enum SlotOutcome {
    Ready(Vec<SharedImage>),
    Failed(NodeFailure),
}

/// The committed result of one node computation.
#[derive(Debug, Clone)]
pub struct CacheSlot {
    /// Node version the result was computed for.
    pub version: u64,
    /// Epoch of the snapshot that produced it.
    pub epoch: u64,
    /// Unique per commit; consumers record it in their [`InputStamp`]s.
    pub stamp: u64,
    pub resolution: (u32, u32),
    pub inputs: Vec<InputStamp>,
    pub outcome: SlotOutcome,
}

impl CacheSlot {
    pub fn output(&self, socket: usize) -> Option<&SharedImage> {
        match &self.outcome {
            SlotOutcome::Ready(outputs) => outputs.get(socket),
            SlotOutcome::Failed(_) => None,
        }
    }
}

/// Result of attempting to store a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// A result for a newer version, or from a newer snapshot of the same
    /// version, is already stored.
    Rejected,
}

/// Per-node cache slots behind one lock.
///
/// Buffers are immutable and handed out as `Arc`s, so readers never observe
/// a slot being overwritten: a commit swaps the whole slot.
#[derive(Debug, Default)]
pub struct NodeCache {
    slots: Mutex<HashMap<NodeId, Arc<CacheSlot>>>,
    stamps: AtomicU64,
    /// Newest epoch that has pruned deleted nodes.
    pruned_epoch: AtomicU64,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<NodeId, Arc<CacheSlot>>> {
        // A panic while holding the lock cannot leave a half-written slot,
        // so a poisoned map is still consistent.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn next_stamp(&self) -> u64 {
        self.stamps.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, id: NodeId) -> Option<Arc<CacheSlot>> {
        self.lock().get(&id).cloned()
    }

    /// Store `slot` unless a newer result is already present.
    pub fn commit(&self, id: NodeId, slot: CacheSlot) -> CommitOutcome {
        let mut slots = self.lock();
        if let Some(existing) = slots.get(&id) {
            let stale = existing.version > slot.version
                || (existing.version == slot.version && existing.epoch >= slot.epoch);
            if stale {
                return CommitOutcome::Rejected;
            }
        }
        slots.insert(id, Arc::new(slot));
        CommitOutcome::Committed
    }

    /// Drop slots of nodes not in `live`, at most once per newer epoch so
    /// that an old snapshot cannot prune nodes added after it was taken.
    pub fn retain(&self, live: &BTreeSet<NodeId>, epoch: u64) -> usize {
        if self.pruned_epoch.fetch_max(epoch, Ordering::AcqRel) >= epoch {
            return 0;
        }
        let mut slots = self.lock();
        let before = slots.len();
        slots.retain(|id, _| live.contains(id));
        before - slots.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(version: u64, epoch: u64, stamp: u64) -> CacheSlot {
        CacheSlot {
            version,
            epoch,
            stamp,
            resolution: (1, 1),
            inputs: vec![],
            outcome: SlotOutcome::Ready(vec![]),
        }
    }

    #[test]
    fn commit_rejects_older_version() {
        let cache = NodeCache::new();
        let id = NodeId(1);
        assert_eq!(cache.commit(id, slot(5, 10, 1)), CommitOutcome::Committed);
        assert_eq!(cache.commit(id, slot(4, 20, 2)), CommitOutcome::Rejected);
        assert_eq!(cache.get(id).unwrap().stamp, 1);
    }

    #[test]
    fn commit_same_version_needs_newer_epoch() {
        let cache = NodeCache::new();
        let id = NodeId(1);
        cache.commit(id, slot(5, 10, 1));
        assert_eq!(cache.commit(id, slot(5, 9, 2)), CommitOutcome::Rejected);
        assert_eq!(cache.commit(id, slot(5, 10, 3)), CommitOutcome::Rejected);
        assert_eq!(cache.commit(id, slot(5, 11, 4)), CommitOutcome::Committed);
        assert_eq!(cache.commit(id, slot(6, 1, 5)), CommitOutcome::Committed);
        assert_eq!(cache.get(id).unwrap().stamp, 5);
    }

    #[test]
    fn retain_ignores_older_epochs() {
        let cache = NodeCache::new();
        cache.commit(NodeId(1), slot(1, 1, 1));
        cache.commit(NodeId(2), slot(1, 1, 2));

        let live: BTreeSet<NodeId> = [NodeId(1)].into_iter().collect();
        assert_eq!(cache.retain(&live, 5), 1);
        assert!(cache.get(NodeId(2)).is_none());

        cache.commit(NodeId(3), slot(1, 6, 3));
        assert_eq!(cache.retain(&live, 4), 0);
        assert!(cache.get(NodeId(3)).is_some());
    }

    #[test]
    fn stamps_are_unique() {
        let cache = NodeCache::new();
        let a = cache.next_stamp();
        let b = cache.next_stamp();
        assert_ne!(a, b);
    }
}
