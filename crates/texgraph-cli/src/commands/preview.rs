//! Preview command implementation
//!
//! Runs the background evaluation service against a render thread driving an
//! offscreen pixel surface, then saves what the surface shows.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use texgraph_core::eval::{EvalEvent, EvaluationService, Evaluator};
use texgraph_core::png::{write_image, PngConfig};
use texgraph_core::preview::{DisplayMode, PixelSurface, RenderContext};
use texgraph_core::ImageBuffer;

use super::{load_config, load_graph};

const EVAL_TIMEOUT: Duration = Duration::from_secs(300);

/// Run the preview command
///
/// # Returns
/// Exit code: 0 if a frame was presented and saved, 1 if evaluation failed
pub fn run(
    graph_path: &str,
    output: &str,
    mode: Option<DisplayMode>,
    config_path: Option<&str>,
) -> Result<ExitCode> {
    let start = Instant::now();
    let config = load_config(config_path)?;
    let graph = load_graph(graph_path, config.as_ref())?;
    let config = config.unwrap_or_default();
    let mode = mode.unwrap_or(config.preview.mode);

    println!(
        "{} {} ({}px, {})",
        "Previewing:".cyan().bold(),
        graph_path,
        config.preview.size,
        mode
    );

    let surface = PixelSurface::new(config.preview.size, mode);
    let (context, bridge) =
        RenderContext::start(surface).context("Failed to start render context")?;
    let service = EvaluationService::start(Evaluator::new(), config.workers, Some(bridge))
        .context("Failed to start evaluation workers")?;

    let ticket = service.request_terminal(&graph)?;
    let event = service.wait_for(ticket, EVAL_TIMEOUT);
    service.shutdown();
    let surface = context
        .shutdown()
        .context("Render thread did not shut down cleanly")?;

    match event {
        Some(EvalEvent::Completed { report, .. }) => {
            println!(
                "  {} {} nodes computed",
                "evaluated".green(),
                report.computed.len()
            );
        }
        Some(EvalEvent::Failed { error, .. }) => {
            println!("  {} {}", "failed".red(), error);
            return Ok(ExitCode::from(1));
        }
        Some(EvalEvent::Superseded { .. }) | None => {
            bail!("evaluation did not finish within {:?}", EVAL_TIMEOUT)
        }
    }

    let pixels = surface
        .pixels()
        .context("Surface never presented a frame")?;
    write_image(
        &ImageBuffer::Color(pixels.clone()),
        Path::new(output),
        &PngConfig::default(),
    )
    .with_context(|| format!("Failed to write {}", output))?;

    println!(
        "  {} {} ({} frame(s) presented)",
        "wrote".green(),
        output,
        surface.presented()
    );
    println!("{} {:.2?}", "Done:".dimmed(), start.elapsed());
    Ok(ExitCode::SUCCESS)
}
