//! Procedural texture graph engine.
//!
//! Textures are described as a directed acyclic graph of operator nodes.
//! This crate provides the pieces needed to edit and evaluate such graphs
//! interactively:
//!
//! - **Image buffers**: immutable grayscale, color and normal rasters shared
//!   by reference count
//! - **Operators**: a closed library of generators, adjustments, blends and
//!   filters, each a pure function over buffers and parameters
//! - **Node graph**: typed sockets, acyclic connections and per-node versions
//! - **Evaluation**: memoized, version-guarded incremental evaluation with a
//!   background worker pool and cooperative cancellation
//! - **Preview**: latest-only handoff of finished buffers to a render thread
//! - **Persistence**: JSON graph documents and deterministic PNG export
//!
//! # Example
//!
//! ```
//! use texgraph_core::graph::NodeGraph;
//! use texgraph_core::eval::Evaluator;
//! use texgraph_core::params::ParamSet;
//!
//! let mut graph = NodeGraph::with_resolution(64, 64).unwrap();
//! let noise = graph
//!     .add_node("perlin_noise", ParamSet::new().with("seed", 42i64))
//!     .unwrap();
//! let blend = graph
//!     .add_node("blend", ParamSet::new().with("mode", "multiply"))
//!     .unwrap();
//! graph.connect(noise, 0, blend, 1).unwrap();
//! graph.set_terminal(Some(blend)).unwrap();
//!
//! let evaluator = Evaluator::new();
//! let image = evaluator.evaluate_terminal(&graph).unwrap();
//! assert_eq!(image.resolution(), (64, 64));
//! ```
//!
//! # Determinism
//!
//! Evaluating the same graph with the same parameters always yields
//! bit-identical buffers: noise is seeded through PCG32 and no operator reads
//! global state.

pub mod buffer;
pub mod color;
pub mod config;
pub mod error;
pub mod eval;
pub mod graph;
pub mod noise;
pub mod operators;
pub mod params;
pub mod persist;
pub mod png;
pub mod preview;
pub mod rng;

pub use buffer::{ChannelType, GrayscaleBuffer, ImageBuffer, SharedImage, TextureBuffer};
pub use color::Color;
pub use config::EngineConfig;
pub use error::{ErrorCode, EvalError, GraphError, OperatorError};
pub use eval::{EvalReport, Evaluator, EvaluationService};
pub use graph::{NodeGraph, NodeId};
pub use operators::OperatorKind;
pub use params::{ParamSet, ParamValue};
pub use persist::GraphDocument;
pub use preview::{PreviewBridge, PreviewFrame, RenderContext};
