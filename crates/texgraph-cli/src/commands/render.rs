//! Render command implementation
//!
//! Evaluates the terminal node (and optionally every exported node) in one
//! pass and writes deterministic PNGs.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use texgraph_core::eval::Evaluator;
use texgraph_core::png::{encode, PngConfig};
use texgraph_core::{GraphError, NodeId};

use super::{load_config, load_graph};

/// One written file.
#[derive(Debug, serde::Serialize)]
struct WrittenImage {
    node: NodeId,
    path: PathBuf,
    width: u32,
    height: u32,
    hash: String,
}

/// Run the render command
///
/// # Returns
/// Exit code: 0 on success, 1 if any requested node failed to evaluate
pub fn run(
    graph_path: &str,
    output: &str,
    config_path: Option<&str>,
    exports_dir: Option<&str>,
    json_output: bool,
) -> Result<ExitCode> {
    let start = Instant::now();
    let config = load_config(config_path)?;
    let graph = load_graph(graph_path, config.as_ref())?;
    let terminal = graph.terminal().ok_or(GraphError::NoTerminal)?;

    let exported: Vec<(NodeId, String)> = match exports_dir {
        Some(_) => graph
            .nodes()
            .filter_map(|n| n.export_name().map(|name| (n.id(), name.to_string())))
            .collect(),
        None => Vec::new(),
    };
    let mut targets = vec![terminal];
    targets.extend(exported.iter().map(|(id, _)| *id));
    targets.sort();
    targets.dedup();

    if !json_output {
        println!("{} {}", "Rendering:".cyan().bold(), graph_path);
    }
    let snapshot = graph.snapshot(&targets)?;
    let report = Evaluator::new().evaluate(&snapshot);

    let mut jobs = vec![(terminal, PathBuf::from(output))];
    if let Some(dir) = exports_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create exports directory: {}", dir))?;
        jobs.extend(
            exported
                .into_iter()
                .map(|(id, name)| (id, Path::new(dir).join(format!("{}.png", name)))),
        );
    }

    let mut written = Vec::new();
    let mut failures = Vec::new();
    let png_config = PngConfig::default();
    for (node, path) in jobs {
        let image = match report.output(node, 0) {
            Ok(image) => image,
            Err(e) => {
                failures.push(e.to_string());
                continue;
            }
        };
        let png = encode(&image, &png_config)
            .with_context(|| format!("Failed to encode {}", node))?;
        std::fs::write(&path, &png.bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(WrittenImage {
            node,
            path,
            width: image.width(),
            height: image.height(),
            hash: png.hash,
        });
    }

    let elapsed = start.elapsed();
    if json_output {
        let summary = serde_json::json!({
            "success": failures.is_empty(),
            "computed": report.computed.len(),
            "written": written,
            "errors": failures,
            "duration_ms": elapsed.as_millis() as u64,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for image in &written {
            println!(
                "  {} {} ({}x{}, {})",
                "wrote".green(),
                image.path.display(),
                image.width,
                image.height,
                &image.hash[..16]
            );
        }
        for failure in &failures {
            println!("  {} {}", "failed".red(), failure);
        }
        println!(
            "{} {} nodes computed in {:.2?}",
            "Done:".dimmed(),
            report.computed.len(),
            elapsed
        );
    }

    if failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}
