//! CLI command implementations

pub mod operators;
pub mod preview;
pub mod render;
pub mod validate;

use anyhow::{Context, Result};
use std::path::Path;

use texgraph_core::{EngineConfig, NodeGraph};

/// Load a graph document, applying the config resolution when one is given.
fn load_graph(graph_path: &str, config: Option<&EngineConfig>) -> Result<NodeGraph> {
    let mut graph = NodeGraph::load(Path::new(graph_path))
        .with_context(|| format!("Failed to load graph: {}", graph_path))?;
    if let Some(config) = config {
        let (width, height) = config.resolution();
        graph.set_resolution(width, height)?;
    }
    Ok(graph)
}

fn load_config(config_path: Option<&str>) -> Result<Option<EngineConfig>> {
    config_path
        .map(|path| {
            EngineConfig::load(Path::new(path))
                .with_context(|| format!("Failed to load config: {}", path))
        })
        .transpose()
}
