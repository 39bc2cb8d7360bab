//! Error types for graph editing and evaluation.

use thiserror::Error;

use crate::buffer::ChannelType;
use crate::graph::NodeId;

/// Stable machine-readable identification for error values.
pub trait ErrorCode {
    /// Returns a stable code such as `GRAPH_003`.
    fn code(&self) -> &'static str;

    /// Returns the error family.
    fn category(&self) -> &'static str;
}

/// Errors raised synchronously by graph mutations and imports.
///
/// A mutation that returns one of these leaves the graph exactly as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("unknown operator kind '{0}'")]
    InvalidOperatorKind(String),

    #[error("channel type mismatch: socket expects {expected}, got {found}")]
    TypeMismatch {
        expected: ChannelType,
        found: ChannelType,
    },

    #[error("cycle detected: connecting {from} to {to} would create a cycle")]
    CycleDetected { from: NodeId, to: NodeId },

    #[error("input socket {socket} of {node} is already connected")]
    SocketOccupied { node: NodeId, socket: usize },

    #[error("invalid value for parameter '{name}': {reason}")]
    InvalidParameterValue { name: String, reason: String },

    #[error("corrupt graph data: {0}")]
    CorruptGraphData(String),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("{node} has no {direction} socket {socket}")]
    UnknownSocket {
        node: NodeId,
        socket: usize,
        direction: &'static str,
    },

    #[error("graph has no terminal node")]
    NoTerminal,

    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("no node ids left to allocate")]
    IdsExhausted,
}

impl GraphError {
    pub(crate) fn invalid_param(name: impl Into<String>, reason: impl Into<String>) -> Self {
        GraphError::InvalidParameterValue {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl ErrorCode for GraphError {
    fn code(&self) -> &'static str {
        match self {
            GraphError::InvalidOperatorKind(_) => "GRAPH_001",
            GraphError::TypeMismatch { .. } => "GRAPH_002",
            GraphError::CycleDetected { .. } => "GRAPH_003",
            GraphError::SocketOccupied { .. } => "GRAPH_004",
            GraphError::InvalidParameterValue { .. } => "GRAPH_005",
            GraphError::CorruptGraphData(_) => "GRAPH_006",
            GraphError::UnknownNode(_) => "GRAPH_007",
            GraphError::UnknownSocket { .. } => "GRAPH_008",
            GraphError::NoTerminal => "GRAPH_009",
            GraphError::InvalidResolution(_) => "GRAPH_010",
            GraphError::IdsExhausted => "GRAPH_011",
        }
    }

    fn category(&self) -> &'static str {
        "graph"
    }
}

/// Error returned by an operator's evaluation function.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct OperatorError(pub String);

impl OperatorError {
    pub fn new(message: impl Into<String>) -> Self {
        OperatorError(message.into())
    }
}

/// Errors surfaced when asking the engine for a node's output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("evaluation of {node} failed: {message}")]
    EvaluationFailure { node: NodeId, message: String },

    #[error("{node} depends on failed node {origin}")]
    UpstreamFailure { node: NodeId, origin: NodeId },

    #[error("evaluation abandoned before {0} was computed")]
    Abandoned(NodeId),

    #[error("no result available for {0}")]
    MissingResult(NodeId),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl ErrorCode for EvalError {
    fn code(&self) -> &'static str {
        match self {
            EvalError::EvaluationFailure { .. } => "EVAL_001",
            EvalError::UpstreamFailure { .. } => "EVAL_002",
            EvalError::Abandoned(_) => "EVAL_003",
            EvalError::MissingResult(_) => "EVAL_004",
            EvalError::Graph(e) => e.code(),
        }
    }

    fn category(&self) -> &'static str {
        match self {
            EvalError::Graph(_) => "graph",
            _ => "evaluation",
        }
    }
}
