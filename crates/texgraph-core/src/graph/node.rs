//! Node identity, socket references and per-node state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operators::{OperatorDef, OperatorKind};
use crate::params::ParamSet;

/// Stable node identifier. Ids are never reused within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Largest id a graph accepts. `u64::MAX` stays free so the allocator can
    /// always step past the highest node.
    pub const MAX: NodeId = NodeId(u64::MAX - 1);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// An output socket: `(node, output index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    pub node: NodeId,
    pub socket: usize,
}

impl OutputRef {
    pub fn new(node: NodeId, socket: usize) -> Self {
        Self { node, socket }
    }
}

/// An input socket: `(node, input index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputRef {
    pub node: NodeId,
    pub socket: usize,
}

impl InputRef {
    pub fn new(node: NodeId, socket: usize) -> Self {
        Self { node, socket }
    }
}

/// A directed edge from an output socket to an input socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection {
    pub from: OutputRef,
    pub to: InputRef,
}

/// An operator instance in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: OperatorKind,
    /// Fully resolved: every declared parameter has a value.
    pub(crate) params: ParamSet,
    pub(crate) input_count: usize,
    pub(crate) version: u64,
    pub(crate) position: [f64; 2],
    pub(crate) export_name: Option<String>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn def(&self) -> &'static OperatorDef {
        self.kind.def()
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn output_count(&self) -> usize {
        self.def().outputs.len()
    }

    /// Bumped on every change that affects this node's output.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Editor position; does not affect evaluation.
    pub fn position(&self) -> [f64; 2] {
        self.position
    }

    /// File stem used when exporting this node's output.
    pub fn export_name(&self) -> Option<&str> {
        self.export_name.as_deref()
    }
}
