//! Immutable copies of the graph state needed by one evaluation pass.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::GraphError;
use crate::operators::OperatorKind;
use crate::params::ParamSet;

use super::{InputRef, NodeGraph, NodeId, OutputRef};

/// Snapshots taken later always carry a larger epoch.
static EPOCH_CLOCK: AtomicU64 = AtomicU64::new(1);

/// One node as seen by an evaluation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotNode {
    pub id: NodeId,
    pub kind: OperatorKind,
    pub version: u64,
    pub params: ParamSet,
    /// Source of each input socket; `None` means the socket default.
    pub inputs: Vec<Option<OutputRef>>,
}

/// The reachable node set of some targets, topologically ordered, with each
/// node's version and parameters frozen at capture time.
///
/// Mutations after capture affect later snapshots only.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    epoch: u64,
    revision: u64,
    resolution: (u32, u32),
    targets: Vec<NodeId>,
    order: Vec<SnapshotNode>,
    index: BTreeMap<NodeId, usize>,
    live: BTreeSet<NodeId>,
}

impl GraphSnapshot {
    /// Capture order; larger is newer.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Graph revision at capture time.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn targets(&self) -> &[NodeId] {
        &self.targets
    }

    /// Nodes in dependency order.
    pub fn nodes(&self) -> &[SnapshotNode] {
        &self.order
    }

    pub fn node(&self, id: NodeId) -> Option<&SnapshotNode> {
        self.index.get(&id).map(|&i| &self.order[i])
    }

    /// Every node present in the graph at capture time, reachable or not.
    pub fn live_nodes(&self) -> &BTreeSet<NodeId> {
        &self.live
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl NodeGraph {
    /// Capture the upstream closure of `targets`.
    pub fn snapshot(&self, targets: &[NodeId]) -> Result<GraphSnapshot, GraphError> {
        for id in targets {
            if !self.contains(*id) {
                return Err(GraphError::UnknownNode(*id));
            }
        }
        Ok(self.capture(targets.to_vec()))
    }

    /// Capture every node; all of them are targets.
    pub fn snapshot_all(&self) -> GraphSnapshot {
        self.capture(self.node_ids().collect())
    }

    /// Capture the terminal node's closure.
    pub fn snapshot_terminal(&self) -> Result<GraphSnapshot, GraphError> {
        let terminal = self.terminal().ok_or(GraphError::NoTerminal)?;
        self.snapshot(&[terminal])
    }

    fn capture(&self, targets: Vec<NodeId>) -> GraphSnapshot {
        let reachable = self.upstream_of(&targets);
        let order: Vec<SnapshotNode> = self
            .topo_order(&reachable)
            .into_iter()
            .filter_map(|id| self.node(id))
            .map(|node| SnapshotNode {
                id: node.id,
                kind: node.kind,
                version: node.version,
                params: node.params.clone(),
                inputs: (0..node.input_count)
                    .map(|socket| self.source_of(InputRef::new(node.id, socket)))
                    .collect(),
            })
            .collect();
        let index = order.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

        GraphSnapshot {
            epoch: EPOCH_CLOCK.fetch_add(1, Ordering::Relaxed),
            revision: self.revision(),
            resolution: self.resolution(),
            targets,
            order,
            index,
            live: self.node_ids().collect(),
        }
    }
}
