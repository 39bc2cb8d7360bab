//! JSON graph documents.
//!
//! A document records topology, parameters and editor metadata. Image
//! buffers are never stored; they are recomputed after import. Import
//! rebuilds the graph through the same checks as interactive edits, and any
//! rejected record surfaces as [`GraphError::CorruptGraphData`].

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::GraphError;
use crate::graph::{next_version, Connection, Node, NodeGraph, NodeId};
use crate::operators::OperatorKind;
use crate::params::ParamSet;

/// Document layout version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Serialized form of a [`NodeGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphDocument {
    pub format_version: u32,
    pub resolution: [u32; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<NodeId>,
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeRecord {
    pub id: NodeId,
    /// Operator tag, e.g. `"blend"`.
    pub kind: String,
    #[serde(default)]
    pub params: ParamSet,
    /// Input socket count; only meaningful for variadic operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<usize>,
    #[serde(default)]
    pub position: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_name: Option<String>,
}

fn corrupt(context: impl std::fmt::Display, err: impl std::fmt::Display) -> GraphError {
    GraphError::CorruptGraphData(format!("{context}: {err}"))
}

impl NodeGraph {
    /// Capture topology and parameters.
    pub fn export(&self) -> GraphDocument {
        let (width, height) = self.resolution();
        GraphDocument {
            format_version: FORMAT_VERSION,
            resolution: [width, height],
            terminal: self.terminal(),
            nodes: self
                .nodes()
                .map(|node| NodeRecord {
                    id: node.id(),
                    kind: node.kind().as_str().to_string(),
                    params: node.params().clone(),
                    inputs: Some(node.input_count()),
                    position: node.position(),
                    export_name: node.export_name().map(str::to_string),
                })
                .collect(),
            connections: self.connections().collect(),
        }
    }

    /// Build a new graph from `doc`.
    pub fn import(doc: &GraphDocument) -> Result<NodeGraph, GraphError> {
        if doc.format_version != FORMAT_VERSION {
            return Err(GraphError::CorruptGraphData(format!(
                "unsupported format_version {} (expected {})",
                doc.format_version, FORMAT_VERSION
            )));
        }
        let [width, height] = doc.resolution;
        let mut graph =
            NodeGraph::with_resolution(width, height).map_err(|e| corrupt("resolution", e))?;

        let mut ids = BTreeSet::new();
        for record in &doc.nodes {
            if !ids.insert(record.id) {
                return Err(GraphError::CorruptGraphData(format!(
                    "duplicate node id {}",
                    record.id
                )));
            }
            graph.insert_node(build_node(record).map_err(|e| corrupt(record.id, e))?);
        }

        for conn in &doc.connections {
            graph
                .connect_exclusive(conn.from.node, conn.from.socket, conn.to.node, conn.to.socket)
                .map_err(|e| {
                    corrupt(
                        format_args!(
                            "connection {}:{} -> {}:{}",
                            conn.from.node, conn.from.socket, conn.to.node, conn.to.socket
                        ),
                        e,
                    )
                })?;
        }

        graph
            .set_terminal(doc.terminal)
            .map_err(|e| corrupt("terminal", e))?;
        info!(
            nodes = graph.len(),
            connections = doc.connections.len(),
            "imported graph"
        );
        Ok(graph)
    }

    /// Replace this graph with the one in `doc`; on error `self` is untouched.
    pub fn load_document(&mut self, doc: &GraphDocument) -> Result<(), GraphError> {
        *self = NodeGraph::import(doc)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(&self.export())
            .map_err(|e| GraphError::CorruptGraphData(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<NodeGraph, GraphError> {
        let doc: GraphDocument =
            serde_json::from_str(text).map_err(|e| corrupt("invalid document", e))?;
        NodeGraph::import(&doc)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let text = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "saved graph");
        Ok(())
    }

    /// Read and import a document. I/O failures are reported as corrupt
    /// data too, naming the path.
    pub fn load(path: &Path) -> Result<NodeGraph, GraphError> {
        let text = std::fs::read_to_string(path).map_err(|e| corrupt(path.display(), e))?;
        NodeGraph::from_json(&text)
    }
}

fn build_node(record: &NodeRecord) -> Result<Node, GraphError> {
    if record.id > NodeId::MAX {
        return Err(GraphError::invalid_param(
            "id",
            format!("must be at most {}", NodeId::MAX),
        ));
    }
    let kind: OperatorKind = record.kind.parse()?;
    let def = kind.def();
    let params = record.params.resolve(&def.params)?;
    let input_count = record.inputs.unwrap_or_else(|| def.default_input_count());
    def.check_input_count(input_count)?;
    if !record.position.iter().all(|v| v.is_finite()) {
        return Err(GraphError::invalid_param("position", "must be finite"));
    }
    Ok(Node {
        id: record.id,
        kind,
        params,
        input_count,
        version: next_version(),
        position: record.position,
        export_name: record.export_name.clone(),
    })
}
