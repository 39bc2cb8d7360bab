//! The node graph: operator instances, typed connections and parameter state.
//!
//! Nodes live in an id-keyed arena and connections refer to nodes by id only.
//! Every mutation validates before it writes, so a failed call leaves the
//! graph exactly as it was; in particular no edit can ever introduce a cycle.
//!
//! Each change that can affect a node's output bumps that node's version.
//! The evaluation engine derives dirtiness from versions, so after a mutation
//! the stale set is precisely the downstream closure of the touched nodes.

mod node;
mod snapshot;
mod topology;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::buffer::validate_resolution;
use crate::error::GraphError;
use crate::operators::OperatorKind;
use crate::params::{ParamSet, ParamValue};

pub use node::{Connection, InputRef, Node, NodeId, OutputRef};
pub use snapshot::{GraphSnapshot, SnapshotNode};

/// Default graph-wide resolution.
pub const DEFAULT_RESOLUTION: (u32, u32) = (256, 256);

/// Process-wide version clock. Versions are unique across graphs, so cache
/// entries can never be confused between an imported graph and its
/// predecessor, or between diverging clones.
static VERSION_CLOCK: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_version() -> u64 {
    VERSION_CLOCK.fetch_add(1, Ordering::Relaxed)
}

/// A texture graph document.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeGraph {
    nodes: BTreeMap<NodeId, Node>,
    /// Incoming edge per connected input socket.
    links: BTreeMap<InputRef, OutputRef>,
    next_id: u64,
    terminal: Option<NodeId>,
    resolution: (u32, u32),
    revision: u64,
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeGraph {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
            next_id: 1,
            terminal: None,
            resolution: DEFAULT_RESOLUTION,
            revision: 0,
        }
    }

    pub fn with_resolution(width: u32, height: u32) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        graph.set_resolution(width, height)?;
        Ok(graph)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All connections, ordered by destination socket.
    pub fn connections(&self) -> impl Iterator<Item = Connection> + '_ {
        self.links
            .iter()
            .map(|(to, from)| Connection { from: *from, to: *to })
    }

    /// The output feeding `input`, if connected.
    pub fn source_of(&self, input: InputRef) -> Option<OutputRef> {
        self.links.get(&input).copied()
    }

    pub fn terminal(&self) -> Option<NodeId> {
        self.terminal
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// Counter bumped by every successful mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn version(&self, id: NodeId) -> Result<u64, GraphError> {
        Ok(self.node_ref(id)?.version)
    }

    fn node_ref(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))
    }

    fn bump(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.version = next_version();
        }
    }

    // ---------------------------------------------------------------------
    // Node lifecycle
    // ---------------------------------------------------------------------

    /// Add a node of the operator named `kind`.
    ///
    /// Parameters not given take the operator's defaults.
    pub fn add_node(&mut self, kind: &str, params: ParamSet) -> Result<NodeId, GraphError> {
        let kind: OperatorKind = kind.parse()?;
        self.add_operator(kind, params)
    }

    pub fn add_operator(
        &mut self,
        kind: OperatorKind,
        params: ParamSet,
    ) -> Result<NodeId, GraphError> {
        let def = kind.def();
        let params = params.resolve(&def.params)?;
        let id = self.fresh_id()?;
        self.insert_node(Node {
            id,
            kind,
            params,
            input_count: def.default_input_count(),
            version: next_version(),
            position: [0.0, 0.0],
            export_name: None,
        });
        debug!(node = %id, kind = %kind, "added node");
        Ok(id)
    }

    fn fresh_id(&self) -> Result<NodeId, GraphError> {
        if self.next_id > NodeId::MAX.0 {
            return Err(GraphError::IdsExhausted);
        }
        Ok(NodeId(self.next_id))
    }

    /// Insert a fully formed node, advancing the id allocator past it.
    /// Callers keep `node.id` at or below [`NodeId::MAX`].
    pub(crate) fn insert_node(&mut self, node: Node) {
        self.next_id = self.next_id.max(node.id.0.saturating_add(1));
        self.nodes.insert(node.id, node);
        self.revision += 1;
    }

    /// Remove a node and every connection touching it.
    ///
    /// Consumers fall back to their socket defaults and become stale.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, GraphError> {
        self.node_ref(id)?;

        let consumers: Vec<NodeId> = self
            .links
            .iter()
            .filter(|(to, from)| from.node == id && to.node != id)
            .map(|(to, _)| to.node)
            .collect();
        self.links.retain(|to, from| to.node != id && from.node != id);
        for consumer in &consumers {
            self.bump(*consumer);
        }
        if self.terminal == Some(id) {
            self.terminal = None;
        }
        let node = self.nodes.remove(&id).ok_or(GraphError::UnknownNode(id))?;
        self.revision += 1;
        debug!(node = %id, consumers = consumers.len(), "removed node");
        Ok(node)
    }

    /// Copy a node's operator, parameters and input count into a new,
    /// unconnected node.
    pub fn duplicate_node(&mut self, id: NodeId) -> Result<NodeId, GraphError> {
        let source = self.node_ref(id)?.clone();
        let new_id = self.fresh_id()?;
        self.insert_node(Node {
            id: new_id,
            version: next_version(),
            position: [source.position[0] + 32.0, source.position[1] + 32.0],
            export_name: None,
            ..source
        });
        debug!(node = %id, copy = %new_id, "duplicated node");
        Ok(new_id)
    }

    /// Swap the operator of a node in place.
    ///
    /// Connections whose sockets still exist with compatible channel types are
    /// kept; the rest are dropped. Parameters are rebuilt from `params` and
    /// the new operator's defaults.
    pub fn replace_node(
        &mut self,
        id: NodeId,
        kind: &str,
        params: ParamSet,
    ) -> Result<(), GraphError> {
        self.node_ref(id)?;
        let kind: OperatorKind = kind.parse()?;
        let def = kind.def();
        let params = params.resolve(&def.params)?;
        let input_count = def.default_input_count();

        let mut dropped = Vec::new();
        for (to, from) in &self.links {
            let keep = if to.node == id {
                let source_channel = self
                    .nodes
                    .get(&from.node)
                    .and_then(|n| n.def().output(from.socket))
                    .map(|o| o.channel);
                match (def.input(to.socket, input_count), source_channel) {
                    (Some(socket), Some(channel)) => socket.channel.accepts(channel),
                    _ => false,
                }
            } else if from.node == id {
                let target = self
                    .nodes
                    .get(&to.node)
                    .and_then(|n| n.def().input(to.socket, n.input_count));
                match (def.output(from.socket), target) {
                    (Some(output), Some(socket)) => socket.channel.accepts(output.channel),
                    _ => false,
                }
            } else {
                true
            };
            if !keep {
                dropped.push(*to);
            }
        }

        for to in &dropped {
            self.links.remove(to);
            if to.node != id {
                self.bump(to.node);
            }
        }
        let node = self.node_mut(id)?;
        node.kind = kind;
        node.params = params;
        node.input_count = input_count;
        node.version = next_version();
        self.revision += 1;
        debug!(node = %id, kind = %kind, dropped = dropped.len(), "replaced node");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Connections
    // ---------------------------------------------------------------------

    /// Connect an output socket to an input socket.
    ///
    /// An existing connection on the input is replaced and returned.
    pub fn connect(
        &mut self,
        src: NodeId,
        src_socket: usize,
        dst: NodeId,
        dst_socket: usize,
    ) -> Result<Option<Connection>, GraphError> {
        let from = OutputRef::new(src, src_socket);
        let to = InputRef::new(dst, dst_socket);
        self.check_connection(from, to)?;

        let previous = self.links.insert(to, from);
        if previous == Some(from) {
            return Ok(None);
        }
        self.bump(dst);
        self.revision += 1;
        debug!(from = %src, to = %dst, socket = dst_socket, replaced = previous.is_some(), "connected");
        Ok(previous.map(|from| Connection { from, to }))
    }

    /// Like [`connect`](Self::connect) but refuses to replace an existing
    /// connection.
    pub fn connect_exclusive(
        &mut self,
        src: NodeId,
        src_socket: usize,
        dst: NodeId,
        dst_socket: usize,
    ) -> Result<(), GraphError> {
        let to = InputRef::new(dst, dst_socket);
        self.check_connection(OutputRef::new(src, src_socket), to)?;
        if self.links.contains_key(&to) {
            return Err(GraphError::SocketOccupied {
                node: dst,
                socket: dst_socket,
            });
        }
        self.connect(src, src_socket, dst, dst_socket).map(|_| ())
    }

    fn check_connection(&self, from: OutputRef, to: InputRef) -> Result<(), GraphError> {
        let src = self.node_ref(from.node)?;
        let dst = self.node_ref(to.node)?;

        let output = src.def().output(from.socket).ok_or(GraphError::UnknownSocket {
            node: from.node,
            socket: from.socket,
            direction: "output",
        })?;
        let input = dst
            .def()
            .input(to.socket, dst.input_count)
            .ok_or(GraphError::UnknownSocket {
                node: to.node,
                socket: to.socket,
                direction: "input",
            })?;

        if !input.channel.accepts(output.channel) {
            return Err(GraphError::TypeMismatch {
                expected: input.channel,
                found: output.channel,
            });
        }

        // The new edge closes a cycle iff the source is already reachable
        // downstream of the destination.
        if from.node == to.node || self.reaches(to.node, from.node) {
            return Err(GraphError::CycleDetected {
                from: from.node,
                to: to.node,
            });
        }
        Ok(())
    }

    /// Remove the connection on an input socket, if any.
    pub fn disconnect(
        &mut self,
        dst: NodeId,
        dst_socket: usize,
    ) -> Result<Option<Connection>, GraphError> {
        self.node_ref(dst)?;
        let to = InputRef::new(dst, dst_socket);
        let removed = self.links.remove(&to);
        if removed.is_some() {
            self.bump(dst);
            self.revision += 1;
            debug!(node = %dst, socket = dst_socket, "disconnected");
        }
        Ok(removed.map(|from| Connection { from, to }))
    }

    /// Change the number of inputs of a variadic node.
    ///
    /// Connections on removed sockets are dropped.
    pub fn set_input_count(&mut self, id: NodeId, count: usize) -> Result<(), GraphError> {
        let node = self.node_ref(id)?;
        node.def().check_input_count(count)?;
        if node.input_count == count {
            return Ok(());
        }
        self.links.retain(|to, _| to.node != id || to.socket < count);
        let node = self.node_mut(id)?;
        node.input_count = count;
        node.version = next_version();
        self.revision += 1;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Parameters and metadata
    // ---------------------------------------------------------------------

    /// Set one parameter, validated against the operator's schema.
    ///
    /// A successful call always advances the node's version.
    pub fn set_parameter(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), GraphError> {
        let value = value.into();
        let node = self.node_ref(id)?;
        let spec = node
            .def()
            .params
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| {
                GraphError::invalid_param(name, format!("{} has no such parameter", node.kind))
            })?;
        spec.validate(&value)?;

        let node = self.node_mut(id)?;
        node.params.insert(name, value);
        node.version = next_version();
        self.revision += 1;
        debug!(node = %id, param = name, "set parameter");
        Ok(())
    }

    /// Designate the node whose output feeds preview and export.
    pub fn set_terminal(&mut self, id: Option<NodeId>) -> Result<(), GraphError> {
        if let Some(id) = id {
            self.node_ref(id)?;
        }
        self.terminal = id;
        self.revision += 1;
        Ok(())
    }

    pub fn set_position(&mut self, id: NodeId, position: [f64; 2]) -> Result<(), GraphError> {
        self.node_mut(id)?.position = position;
        self.revision += 1;
        Ok(())
    }

    pub fn set_export_name(&mut self, id: NodeId, name: Option<String>) -> Result<(), GraphError> {
        self.node_mut(id)?.export_name = name;
        self.revision += 1;
        Ok(())
    }

    /// Change the graph-wide target resolution. Every cached buffer becomes
    /// stale.
    pub fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), GraphError> {
        validate_resolution(width, height)?;
        self.resolution = (width, height);
        self.revision += 1;
        Ok(())
    }
}
