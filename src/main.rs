use std::path::Path;
use std::time::{Duration, Instant};

use clap::Parser;
use graphscene::{FocusOptions, LayoutMode, ReshapeOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands, EngineArgs};

mod cli;
mod server;

/// Simulated frame step for offline rendering
const FRAME_STEP_MS: f64 = 16.0;

/// How long `render` waits for in-flight avatars before the last frame
const AVATAR_SETTLE: Duration = Duration::from_secs(2);

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "graphscene=debug" } else { "graphscene=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn render(
    args: &EngineArgs,
    output: &Path,
    frames: u32,
    layout: Option<LayoutMode>,
    focus: Option<usize>,
) -> anyhow::Result<()> {
    let mut engine = args.build()?;
    if let Some(mode) = layout {
        engine.reshape_layout(mode, ReshapeOptions::default());
        engine.fit_to_content();
    }
    if let Some(index) = focus {
        engine.focus_index(index, FocusOptions::default());
    }

    let mut now = 0.0;
    for _ in 0..frames.max(1) {
        engine.frame(now);
        now += FRAME_STEP_MS;
    }

    // Avatar decodes run on worker threads; give them a moment to land
    let started = Instant::now();
    while engine.stats().avatars_in_flight > 0 && started.elapsed() < AVATAR_SETTLE {
        std::thread::sleep(Duration::from_millis(10));
        engine.frame(now);
        now += FRAME_STEP_MS;
    }
    engine.frame(now);

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    engine.save_png(output)?;

    let stats = engine.stats();
    println!(
        "Rendered {} nodes from '{}' with the {} backend to {}",
        stats.node_count,
        args.tile.display(),
        engine.backend(),
        output.display()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Render {
            engine,
            output,
            frames,
            layout,
            focus,
        } => {
            render(&engine, &output, frames, layout, focus)?;
        }
        Commands::Serve { engine, output, port } => {
            let scene = engine.build()?;
            server::serve(scene, &engine.tile, &output, port).await?;
        }
    }

    Ok(())
}
