use anyhow::{bail, Context, Result};
use clap::Parser;
use serfsim::demo::build_demo_colony;
use serfsim::report::{format_metrics, TickSummary};
use serfsim_core::profiling::{init_tracy, TraceLevel};
use serfsim_core::{Game, SimConfig};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of ticks to run
    #[arg(short, long, default_value_t = 100)]
    ticks: u32,

    /// Seed for the demo colony and the game RNG
    #[arg(long, default_value_t = 12345)]
    seed: u64,

    /// JSON file with simulation settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from a JSON world snapshot instead of the demo colony
    #[arg(long)]
    load: Option<PathBuf>,

    /// Serf save (.txt or .bin) to restore on top of the world
    #[arg(long)]
    serfs: Option<PathBuf>,

    /// Print a summary line every N ticks (0 = only at the end)
    #[arg(long, default_value_t = 0)]
    report_every: u32,

    /// Write the final world as a JSON snapshot
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the final serfs as a text save
    #[arg(long)]
    save_text: Option<PathBuf>,

    /// Write the final serfs as a binary save
    #[arg(long)]
    save_binary: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Tracy span level (info, debug, trace); needs the `tracy` feature
    #[arg(long, default_value = "info")]
    trace_level: TraceLevel,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = std::str::FromStr::from_str(&args.log_level).unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    #[cfg(feature = "tracy")]
    tracy_client::Client::start();
    init_tracy(args.trace_level);

    let config = match &args.config {
        Some(path) => {
            let text = read_text(path)?;
            SimConfig::from_json(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SimConfig::default(),
    };

    let mut game = match &args.load {
        Some(path) => {
            let text = read_text(path)?;
            let mut game: Game = serde_json::from_str(&text)
                .with_context(|| format!("parsing snapshot {}", path.display()))?;
            if args.config.is_some() {
                game.config = config;
            }
            game
        }
        None => build_demo_colony(args.seed, config)?,
    };

    if let Some(path) = &args.serfs {
        load_serfs(&mut game, path)?;
    }

    log::info!(
        "Starting at game time {} with {} serfs",
        game.game_time,
        game.serfs.len()
    );
    println!("{}", TickSummary::of(&game));

    for done in 1..=args.ticks {
        if let Err(err) = game.update() {
            log::warn!("tick {}: {}", game.game_time, err);
        }
        if args.report_every > 0 && done % args.report_every == 0 && done != args.ticks {
            println!("{}", TickSummary::of(&game));
        }
    }

    println!("{}", TickSummary::of(&game));
    println!("{}", format_metrics(&game.metrics));

    if let Some(path) = &args.snapshot {
        let json = game.snapshot_json()?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        log::info!("Wrote snapshot to {}", path.display());
    }
    if let Some(path) = &args.save_text {
        fs::write(path, game.save_serfs_text())
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("Wrote text save to {}", path.display());
    }
    if let Some(path) = &args.save_binary {
        fs::write(path, game.save_serfs_binary())
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("Wrote binary save to {}", path.display());
    }

    log::info!("Simulation finished at game time {}", game.game_time);
    Ok(())
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn load_serfs(game: &mut Game, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("txt") => game.load_serfs_text(&read_text(path)?)?,
        Some("bin") => {
            let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            game.load_serfs_binary(&bytes)?
        }
        _ => bail!("{}: serf saves end in .txt or .bin", path.display()),
    }
    Ok(())
}
