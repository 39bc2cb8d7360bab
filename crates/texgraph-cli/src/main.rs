//! texgraph CLI - render, validate and preview procedural texture graphs
//!
//! Graph documents are the JSON files written by `NodeGraph::save`.

use clap::{ArgAction, Parser, Subcommand};
use std::process::ExitCode;

use texgraph_core::preview::DisplayMode;

mod commands;

/// texgraph - Procedural Texture Graph Engine
#[derive(Parser)]
#[command(name = "texgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a graph's terminal node and write it as PNG
    Render {
        /// Path to the graph document
        graph: String,

        /// Output PNG path
        #[arg(short, long)]
        output: String,

        /// Engine config file (JSON); its resolution overrides the graph's
        #[arg(long)]
        config: Option<String>,

        /// Also write every node with an export name into this directory
        #[arg(long)]
        exports: Option<String>,

        /// Output machine-readable JSON summary (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Check a graph document without evaluating it
    Validate {
        /// Path to the graph document
        graph: String,

        /// Output machine-readable JSON diagnostics (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// List operators with their sockets and parameter schemas
    Operators {
        /// Print the full schema as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the background evaluator and render thread end to end and save
    /// what the preview surface shows
    Preview {
        /// Path to the graph document
        graph: String,

        /// Output PNG path
        #[arg(short, long)]
        output: String,

        /// How alpha is displayed (color, checker, alpha)
        #[arg(long)]
        mode: Option<DisplayMode>,

        /// Engine config file (JSON)
        #[arg(long)]
        config: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Render {
            graph,
            output,
            config,
            exports,
            json,
        } => commands::render::run(&graph, &output, config.as_deref(), exports.as_deref(), json),
        Commands::Validate { graph, json } => commands::validate::run(&graph, json),
        Commands::Operators { json } => commands::operators::run(json),
        Commands::Preview {
            graph,
            output,
            mode,
            config,
        } => commands::preview::run(&graph, &output, mode, config.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}
