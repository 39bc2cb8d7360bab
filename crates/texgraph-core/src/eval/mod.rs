//! Memoized evaluation of graph snapshots.
//!
//! A pass walks a [`GraphSnapshot`] in dependency order. A node is reused
//! when its cache slot was computed for the node's current version and
//! resolution from exactly the upstream results the pass sees now; anything
//! else is recomputed once and committed through the version guard in
//! [`NodeCache::commit`].

mod cache;
mod worker;

pub use cache::{CacheSlot, CommitOutcome, InputStamp, NodeCache, NodeFailure, SlotOutcome};
pub use worker::{EvalEvent, EvaluationService, JobTicket};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::buffer::{conform, SharedImage};
use crate::error::{EvalError, GraphError};
use crate::graph::{GraphSnapshot, NodeGraph, NodeId, SnapshotNode};
use crate::operators::EvalContext;

/// Cooperative cancellation flag, checked between nodes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cache state of one node relative to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    /// A cached result matches the node's version and inputs.
    Clean,
    /// The next pass will recompute it.
    Dirty,
    /// The cached outcome is an operator failure.
    Failed { message: String },
    /// The cached outcome is a failure inherited from `origin`.
    UpstreamFailed { origin: NodeId },
}

/// What one pass did.
#[derive(Debug, Clone, Default)]
pub struct EvalReport {
    pub epoch: u64,
    /// Nodes whose operator ran, in evaluation order.
    pub computed: Vec<NodeId>,
    /// Nodes served from the cache.
    pub reused: Vec<NodeId>,
    /// Nodes whose outcome in this pass is a failure.
    pub failed: Vec<NodeId>,
    /// Results that lost the version guard to a newer pass.
    pub rejected_commits: usize,
    /// Outcome for each snapshot target.
    pub outputs: BTreeMap<NodeId, Result<Vec<SharedImage>, EvalError>>,
    /// First node skipped because the pass was cancelled.
    pub abandoned: Option<NodeId>,
}

impl EvalReport {
    /// One output buffer of a target.
    pub fn output(&self, id: NodeId, socket: usize) -> Result<SharedImage, EvalError> {
        match self.outputs.get(&id) {
            Some(Ok(outputs)) => outputs
                .get(socket)
                .cloned()
                .ok_or(EvalError::MissingResult(id)),
            Some(Err(e)) => Err(e.clone()),
            None => Err(EvalError::MissingResult(id)),
        }
    }

    pub fn was_computed(&self, id: NodeId) -> bool {
        self.computed.contains(&id)
    }

    pub fn is_complete(&self) -> bool {
        self.abandoned.is_none()
    }
}

/// Evaluates snapshots of one graph against a shared cache.
///
/// Clones share the cache, so several threads may run passes concurrently;
/// the version guard decides which result survives.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    cache: Arc<NodeCache>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &NodeCache {
        &self.cache
    }

    /// Snapshot the terminal node and evaluate it.
    pub fn evaluate_terminal(&self, graph: &NodeGraph) -> Result<SharedImage, EvalError> {
        let snapshot = graph.snapshot_terminal()?;
        let terminal = graph.terminal().ok_or(GraphError::NoTerminal)?;
        self.evaluate(&snapshot).output(terminal, 0)
    }

    /// Run a pass to completion.
    pub fn evaluate(&self, snapshot: &GraphSnapshot) -> EvalReport {
        self.evaluate_with(snapshot, &CancelToken::new())
    }

    /// Run a pass, stopping before the next node once `cancel` is set.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(epoch = snapshot.epoch(), nodes = snapshot.len())
    )]
    pub fn evaluate_with(&self, snapshot: &GraphSnapshot, cancel: &CancelToken) -> EvalReport {
        let retired = self.cache.retain(snapshot.live_nodes(), snapshot.epoch());
        if retired > 0 {
            tracing::debug!(retired, "retired cache slots of deleted nodes");
        }

        let (width, height) = snapshot.resolution();
        let ctx = EvalContext::new(width, height);
        let mut report = EvalReport {
            epoch: snapshot.epoch(),
            ..EvalReport::default()
        };
        let mut seen: HashMap<NodeId, Arc<CacheSlot>> = HashMap::new();

        for node in snapshot.nodes() {
            if cancel.is_cancelled() {
                tracing::debug!(node = %node.id, "pass cancelled");
                report.abandoned = Some(node.id);
                break;
            }

            let stamps = input_stamps(node, &seen);
            let slot = match self.cache.get(node.id) {
                Some(slot) if is_current(&slot, node, snapshot.resolution(), &stamps) => {
                    report.reused.push(node.id);
                    slot
                }
                _ => {
                    let outcome = self.compute(node, &seen, &ctx, &mut report);
                    let slot = CacheSlot {
                        version: node.version,
                        epoch: snapshot.epoch(),
                        stamp: self.cache.next_stamp(),
                        resolution: snapshot.resolution(),
                        inputs: stamps,
                        outcome,
                    };
                    if self.cache.commit(node.id, slot.clone()) == CommitOutcome::Rejected {
                        tracing::debug!(node = %node.id, "stale result not committed");
                        report.rejected_commits += 1;
                    }
                    // The pass keeps using its own result so that every
                    // consumer sees one consistent set of inputs.
                    Arc::new(slot)
                }
            };
            if matches!(slot.outcome, SlotOutcome::Failed(_)) {
                report.failed.push(node.id);
            }
            seen.insert(node.id, slot);
        }

        for &target in snapshot.targets() {
            let result = match seen.get(&target) {
                Some(slot) => target_result(target, slot),
                None => Err(EvalError::Abandoned(target)),
            };
            report.outputs.insert(target, result);
        }

        tracing::debug!(
            computed = report.computed.len(),
            reused = report.reused.len(),
            failed = report.failed.len(),
            rejected = report.rejected_commits,
            "pass finished"
        );
        report
    }

    fn compute(
        &self,
        node: &SnapshotNode,
        seen: &HashMap<NodeId, Arc<CacheSlot>>,
        ctx: &EvalContext,
        report: &mut EvalReport,
    ) -> SlotOutcome {
        let def = node.kind.def();
        let count = node.inputs.len();
        let mut inputs: Vec<SharedImage> = Vec::with_capacity(count);

        for (index, source) in node.inputs.iter().enumerate() {
            let Some(socket) = def.input(index, count) else {
                return SlotOutcome::Failed(NodeFailure::Operator {
                    message: format!("{} has no input {}", node.kind, index),
                });
            };
            let buffer = match source {
                None => Arc::new(socket.default.to_buffer(socket.channel, ctx)),
                Some(out) => {
                    let Some(upstream) = seen.get(&out.node) else {
                        return SlotOutcome::Failed(NodeFailure::Upstream { origin: out.node });
                    };
                    match &upstream.outcome {
                        SlotOutcome::Failed(NodeFailure::Operator { .. }) => {
                            return SlotOutcome::Failed(NodeFailure::Upstream { origin: out.node });
                        }
                        SlotOutcome::Failed(NodeFailure::Upstream { origin }) => {
                            return SlotOutcome::Failed(NodeFailure::Upstream { origin: *origin });
                        }
                        SlotOutcome::Ready(outputs) => match outputs.get(out.socket) {
                            Some(buf) => conform(buf, socket.channel, ctx.width, ctx.height),
                            None => {
                                return SlotOutcome::Failed(NodeFailure::Operator {
                                    message: format!(
                                        "{} has no output {}",
                                        out.node, out.socket
                                    ),
                                });
                            }
                        },
                    }
                }
            };
            inputs.push(buffer);
        }

        report.computed.push(node.id);
        match def.evaluate(&node.params, &inputs, ctx) {
            Ok(outputs) => SlotOutcome::Ready(outputs.into_iter().map(Arc::new).collect()),
            Err(e) => {
                tracing::warn!(node = %node.id, kind = %node.kind, error = %e, "operator failed");
                SlotOutcome::Failed(NodeFailure::Operator { message: e.0 })
            }
        }
    }

    /// Nodes of `snapshot` the next pass would recompute or re-derive.
    ///
    /// A node is dirty when its cached result is missing, was computed for
    /// another version or resolution, was computed from different upstream
    /// results, or when any node it reads from is dirty.
    pub fn dirty_nodes(&self, snapshot: &GraphSnapshot) -> BTreeSet<NodeId> {
        let mut dirty = BTreeSet::new();
        let mut seen: HashMap<NodeId, Arc<CacheSlot>> = HashMap::new();

        for node in snapshot.nodes() {
            let upstream_dirty = node
                .inputs
                .iter()
                .flatten()
                .any(|out| dirty.contains(&out.node));
            let slot = self.cache.get(node.id);
            let clean = !upstream_dirty
                && slot.as_ref().is_some_and(|slot| {
                    is_current(
                        slot,
                        node,
                        snapshot.resolution(),
                        &input_stamps(node, &seen),
                    )
                });
            match slot {
                Some(slot) if clean => {
                    seen.insert(node.id, slot);
                }
                _ => {
                    dirty.insert(node.id);
                }
            }
        }
        dirty
    }

    /// State of `id` relative to `snapshot`, or `None` if the snapshot does
    /// not contain it.
    pub fn node_state(&self, snapshot: &GraphSnapshot, id: NodeId) -> Option<NodeState> {
        snapshot.node(id)?;
        if self.dirty_nodes(snapshot).contains(&id) {
            return Some(NodeState::Dirty);
        }
        let slot = self.cache.get(id)?;
        Some(match &slot.outcome {
            SlotOutcome::Ready(_) => NodeState::Clean,
            SlotOutcome::Failed(NodeFailure::Operator { message }) => NodeState::Failed {
                message: message.clone(),
            },
            SlotOutcome::Failed(NodeFailure::Upstream { origin }) => {
                NodeState::UpstreamFailed { origin: *origin }
            }
        })
    }

    /// The committed result for `id`, if it matches the node's version in
    /// `graph`.
    pub fn cached_output(
        &self,
        graph: &NodeGraph,
        id: NodeId,
        socket: usize,
    ) -> Result<SharedImage, EvalError> {
        let version = graph.version(id)?;
        let slot = self
            .cache
            .get(id)
            .filter(|slot| slot.version == version && slot.resolution == graph.resolution())
            .ok_or(EvalError::MissingResult(id))?;
        match &slot.outcome {
            SlotOutcome::Ready(outputs) => {
                outputs.get(socket).cloned().ok_or(EvalError::MissingResult(id))
            }
            SlotOutcome::Failed(failure) => Err(failure_error(id, failure)),
        }
    }
}

/// Stamps of the upstream results `node` would read in this pass.
///
/// An input whose source has no result yet gets stamp 0, which no commit
/// carries.
fn input_stamps(node: &SnapshotNode, seen: &HashMap<NodeId, Arc<CacheSlot>>) -> Vec<InputStamp> {
    node.inputs
        .iter()
        .map(|source| match source {
            None => InputStamp::Default,
            Some(out) => InputStamp::Linked {
                node: out.node,
                socket: out.socket,
                stamp: seen.get(&out.node).map_or(0, |slot| slot.stamp),
            },
        })
        .collect()
}

fn is_current(
    slot: &CacheSlot,
    node: &SnapshotNode,
    resolution: (u32, u32),
    stamps: &[InputStamp],
) -> bool {
    slot.version == node.version && slot.resolution == resolution && slot.inputs == stamps
}

fn target_result(id: NodeId, slot: &CacheSlot) -> Result<Vec<SharedImage>, EvalError> {
    match &slot.outcome {
        SlotOutcome::Ready(outputs) => Ok(outputs.clone()),
        SlotOutcome::Failed(failure) => Err(failure_error(id, failure)),
    }
}

fn failure_error(id: NodeId, failure: &NodeFailure) -> EvalError {
    match failure {
        NodeFailure::Operator { message } => EvalError::EvaluationFailure {
            node: id,
            message: message.clone(),
        },
        NodeFailure::Upstream { origin } => EvalError::UpstreamFailure {
            node: id,
            origin: *origin,
        },
    }
}
