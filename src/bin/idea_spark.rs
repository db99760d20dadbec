//! Idea Spark headless driver
//!
//! Seeds a concept, expands it with the Gemini collaborator, runs the
//! layout for a number of frames and prints where every concept landed.
//!
//! Usage:
//!   GEMINI_API_KEY=... cargo run --features cli --bin idea-spark -- ocean \
//!     --expansions 2 --frames 600 --storage .idea-spark

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use idea_spark::expansion::ExpansionOutcome;
use idea_spark::runtime::{self, ExpandReport};
use idea_spark::{CanvasSettings, GeminiClient, IdeaCanvas};

/// Grow a concept forest from the terminal
#[derive(Parser, Debug)]
#[command(name = "idea-spark")]
#[command(about = "Seed and expand a concept graph headlessly")]
struct Args {
    /// Concept to seed
    seed: String,

    /// Number of expansion rounds; each round expands the first new child
    #[arg(long, short = 'e', default_value_t = 1)]
    expansions: usize,

    /// Simulation frames (1/60 s each) to run before printing
    #[arg(long, short = 'f', default_value_t = 300)]
    frames: usize,

    /// Snapshot directory (overrides the settings file)
    #[arg(long, short = 's')]
    storage: Option<PathBuf>,

    /// Settings file (defaults to IDEA_SPARK_CONFIG / config/canvas_settings.yaml)
    #[arg(long, short = 'c', env = "IDEA_SPARK_CONFIG")]
    config: Option<PathBuf>,

    /// Clear any persisted canvas first
    #[arg(long)]
    fresh: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "idea_spark=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => CanvasSettings::load(path)?,
        None => CanvasSettings::from_env(),
    };
    if let Some(dir) = args.storage {
        settings.storage.snapshot_dir = dir;
    }

    let mut canvas = IdeaCanvas::open(&settings);
    if args.fresh {
        let token = canvas.request_clear();
        canvas.confirm_clear(token);
    }
    let seed = canvas
        .submit_text(&args.seed)
        .ok_or_else(|| anyhow::anyhow!("seed concept is blank"))?;

    let canvas = runtime::shared(canvas);
    let expander = GeminiClient::from_env();

    let mut target = seed.id;
    for round in 1..=args.expansions {
        let outcome = loop {
            match runtime::expand(&canvas, &expander, target).await {
                ExpandReport::Selected(_) => continue,
                ExpandReport::Finished(outcome) => break Some(outcome),
                ExpandReport::Busy | ExpandReport::UnknownNode(_) | ExpandReport::Ignored => {
                    break None
                }
            }
        };

        match outcome {
            Some(ExpansionOutcome::Expanded(batch)) => {
                tracing::info!(round, added = batch.children.len(), "Expanded");
                match batch.children.first() {
                    Some(child) => target = *child,
                    None => break,
                }
            }
            Some(ExpansionOutcome::Failed(e)) => {
                tracing::warn!(round, "Expansion failed: {}", e);
                break;
            }
            Some(ExpansionOutcome::NoNewConcepts) | None => break,
        }
    }

    let mut canvas = canvas.lock().await;
    for _ in 0..args.frames {
        canvas.frame(1.0 / 60.0);
    }
    canvas.save();

    println!("{:<5} {:<32} {:>10} {:>10}", "LEVEL", "CONCEPT", "X", "Y");
    for view in canvas.node_views() {
        println!(
            "{:<5} {:<32} {:>10.1} {:>10.1}",
            view.level, view.text, view.world_pos.x, view.world_pos.y
        );
    }
    println!(
        "{} concepts, {} links, alpha {:.3}",
        canvas.store().nodes().len(),
        canvas.store().links().len(),
        canvas.simulation().alpha()
    );

    Ok(())
}
