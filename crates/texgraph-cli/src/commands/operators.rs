//! Operators command implementation
//!
//! Lists the operator registry.

use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;

use texgraph_core::operators::{registry, Arity, OperatorDef};
use texgraph_core::params::ParamKind;

/// Run the operators command
pub fn run(json_output: bool) -> Result<ExitCode> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(registry())?);
    } else {
        for def in registry() {
            print_def(def);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_def(def: &OperatorDef) {
    println!("{} - {}", def.kind.as_str().cyan().bold(), def.label);
    println!("  {}", def.description.dimmed());

    let inputs = def
        .inputs
        .iter()
        .map(|s| format!("{}: {}", s.name, s.channel))
        .collect::<Vec<_>>()
        .join(", ");
    let inputs = match def.arity {
        Arity::Fixed => inputs,
        Arity::Variadic { min } => format!("{}... (at least {})", inputs, min),
    };
    let outputs = def
        .outputs
        .iter()
        .map(|s| format!("{}: {}", s.name, s.channel))
        .collect::<Vec<_>>()
        .join(", ");
    println!("  in  ({})", inputs);
    println!("  out ({})", outputs);

    for param in &def.params {
        println!(
            "    {} {} = {}",
            param.name.green(),
            kind_label(&param.kind).dimmed(),
            param.default
        );
    }
}

fn kind_label(kind: &ParamKind) -> String {
    match kind {
        ParamKind::Scalar { min, max } => format!("scalar [{}, {}]", min, max),
        ParamKind::Integer { min, max } => format!("integer [{}, {}]", min, max),
        ParamKind::Bool => "bool".to_string(),
        ParamKind::Color => "color".to_string(),
        ParamKind::Enum { options } => format!("enum {{{}}}", options.join("|")),
        ParamKind::Curve => "curve".to_string(),
        ParamKind::Gradient => "gradient".to_string(),
    }
}
