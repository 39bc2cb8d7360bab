//! Validate command implementation
//!
//! Imports a graph document with the same checks the engine applies when
//! loading, without evaluating anything.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::process::ExitCode;

use texgraph_core::error::ErrorCode;
use texgraph_core::{NodeGraph, NodeId};

#[derive(Debug, Serialize)]
struct ValidateOutput {
    success: bool,
    graph: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    nodes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    connections: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    terminal: Option<NodeId>,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
}

#[derive(Debug, Serialize)]
struct Diagnostic {
    code: String,
    message: String,
}

/// Run the validate command
///
/// # Returns
/// Exit code: 0 if valid, 1 if invalid
pub fn run(graph_path: &str, json_output: bool) -> Result<ExitCode> {
    let text = std::fs::read_to_string(graph_path)
        .with_context(|| format!("Failed to read graph: {}", graph_path))?;
    let output = check(graph_path, &text);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_human(&output);
    }

    if output.success {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn check(graph_path: &str, text: &str) -> ValidateOutput {
    let graph = match NodeGraph::from_json(text) {
        Ok(graph) => graph,
        Err(e) => {
            return ValidateOutput {
                success: false,
                graph: graph_path.to_string(),
                nodes: None,
                connections: None,
                terminal: None,
                errors: vec![Diagnostic {
                    code: e.code().to_string(),
                    message: e.to_string(),
                }],
                warnings: Vec::new(),
            }
        }
    };

    ValidateOutput {
        success: true,
        graph: graph_path.to_string(),
        nodes: Some(graph.len()),
        connections: Some(graph.connections().count()),
        terminal: graph.terminal(),
        errors: Vec::new(),
        warnings: warnings(&graph),
    }
}

fn warnings(graph: &NodeGraph) -> Vec<Diagnostic> {
    let Some(terminal) = graph.terminal() else {
        return vec![Diagnostic {
            code: "W_NO_TERMINAL".to_string(),
            message: "graph has no terminal node; render will fail".to_string(),
        }];
    };

    let exported: Vec<NodeId> = graph
        .nodes()
        .filter(|n| n.export_name().is_some())
        .map(|n| n.id())
        .collect();
    let mut used: BTreeSet<NodeId> = graph.upstream(terminal);
    used.extend(graph.upstream_of(&exported));

    graph
        .node_ids()
        .filter(|id| !used.contains(id))
        .map(|id| Diagnostic {
            code: "W_UNREACHABLE".to_string(),
            message: format!("{} does not feed the terminal or any export", id),
        })
        .collect()
}

fn print_human(output: &ValidateOutput) {
    println!("{} {}", "Validating:".cyan().bold(), output.graph);
    for error in &output.errors {
        println!("  {} [{}] {}", "x".red(), error.code, error.message);
    }
    for warning in &output.warnings {
        println!(
            "  {} [{}] {}",
            "!".yellow(),
            warning.code.dimmed(),
            warning.message
        );
    }
    if output.success {
        println!(
            "{} {} nodes, {} connections",
            "Valid:".green().bold(),
            output.nodes.unwrap_or(0),
            output.connections.unwrap_or(0)
        );
    } else {
        println!("{}", "Invalid".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use texgraph_core::params::ParamSet;

    #[test]
    fn valid_graph_with_dangling_node_warns() {
        let mut g = NodeGraph::with_resolution(8, 8).unwrap();
        let c = g.add_node("constant", ParamSet::new()).unwrap();
        let inv = g.add_node("invert", ParamSet::new()).unwrap();
        let stray = g.add_node("checker", ParamSet::new()).unwrap();
        g.connect(c, 0, inv, 0).unwrap();
        g.set_terminal(Some(inv)).unwrap();

        let output = check("g.json", &g.to_json().unwrap());
        assert!(output.success);
        assert_eq!(output.nodes, Some(3));
        assert_eq!(output.connections, Some(1));
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].message.contains(&stray.to_string()));
    }

    #[test]
    fn exported_nodes_are_not_dangling() {
        let mut g = NodeGraph::with_resolution(8, 8).unwrap();
        let c = g.add_node("constant", ParamSet::new()).unwrap();
        let stray = g.add_node("checker", ParamSet::new()).unwrap();
        g.set_terminal(Some(c)).unwrap();
        g.set_export_name(stray, Some("mask".into())).unwrap();

        let output = check("g.json", &g.to_json().unwrap());
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn missing_terminal_warns() {
        let mut g = NodeGraph::with_resolution(8, 8).unwrap();
        g.add_node("constant", ParamSet::new()).unwrap();
        let output = check("g.json", &g.to_json().unwrap());
        assert!(output.success);
        assert_eq!(output.warnings[0].code, "W_NO_TERMINAL");
    }

    #[test]
    fn corrupt_document_is_invalid() {
        let output = check("g.json", r#"{"format_version":1}"#);
        assert!(!output.success);
        assert_eq!(output.errors[0].code, "GRAPH_006");
    }

    #[test]
    fn invalid_file_exits_with_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{").unwrap();
        let code = run(path.to_str().unwrap(), true).unwrap();
        assert_eq!(code, ExitCode::from(1));
    }
}
