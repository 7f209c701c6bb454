//! gta-detect
//!
//! Replays captured game frames through the detection pipeline, or runs a
//! single value parser on a piece of recognized text.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::info;
use tracing_subscriber::prelude::*;

use gta_detect::config::EngineConfig;
use gta_detect::parsers::{BusinessParser, MissionParser, MoneyParser, TimerParser};
use gta_detect::paths;
use gta_detect::pipeline::{create_work_queue, queue_frames, run_detection_worker, Pipeline};

#[derive(Parser)]
#[command(name = "gta-detect", version)]
#[command(about = "Game state detection and HUD value parsing for captured frames")]
struct Cli {
    /// Config file (defaults to the per-user config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every frame in a directory through detection, in file name order
    Replay {
        /// Directory of captured frames
        dir: PathBuf,

        /// Template directory (overrides the config)
        #[arg(long)]
        templates: Option<PathBuf>,

        /// Tesseract executable (overrides the config)
        #[arg(long)]
        tesseract: Option<PathBuf>,

        /// Write JSON lines here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse one piece of recognized text
    Parse {
        kind: ParseKind,
        text: String,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ParseKind {
    Money,
    Timer,
    Mission,
    Business,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug { "gta_detect=debug,info" } else { "gta_detect=info,warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(paths::get_config_path);

    match cli.command {
        Commands::Replay {
            dir,
            templates,
            tesseract,
            output,
        } => {
            let mut config = load_config(&config_path, cli.config.is_some())?;
            if templates.is_some() {
                config.templates.dir = templates;
            } else if config.templates.dir.is_none() && paths::get_templates_dir().is_dir() {
                config.templates.dir = Some(paths::get_templates_dir());
            }
            if tesseract.is_some() {
                config.ocr.tesseract_path = tesseract;
            }
            replay(&config, &dir, output.as_deref())
        }
        Commands::Parse { kind, text } => {
            let config = load_config(&config_path, cli.config.is_some())?;
            parse(&config, kind, &text)
        }
        Commands::InitConfig { force } => {
            if config_path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            EngineConfig::default().save(&config_path)?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }
    }
}

/// An explicitly named config must load; the default one may be absent.
fn load_config(path: &Path, explicit: bool) -> Result<EngineConfig> {
    if explicit {
        EngineConfig::load(path)
    } else {
        Ok(EngineConfig::load_or_default(path))
    }
}

fn replay(config: &EngineConfig, dir: &Path, output: Option<&Path>) -> Result<()> {
    let pipeline = Pipeline::from_config(config)?;

    let writer: Box<dyn Write + Send> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout()),
    };

    let (sender, receiver) = create_work_queue();
    let worker = thread::Builder::new()
        .name("detection".to_string())
        .spawn(move || run_detection_worker(receiver, pipeline, writer))
        .context("Failed to spawn detection worker")?;

    let queued = queue_frames(dir, &sender);
    drop(sender);

    let summary = worker
        .join()
        .map_err(|_| anyhow::anyhow!("Detection worker panicked"))?;
    let queued = queued?;

    info!(
        "Replay complete: {} queued, {} processed, {} skipped",
        queued, summary.processed, summary.skipped
    );
    Ok(())
}

fn parse(config: &EngineConfig, kind: ParseKind, text: &str) -> Result<()> {
    let json = match kind {
        ParseKind::Money => serde_json::to_string_pretty(&MoneyParser::new(config.money.clone()).parse(text))?,
        ParseKind::Timer => serde_json::to_string_pretty(&TimerParser::new().parse(text))?,
        ParseKind::Mission => serde_json::to_string_pretty(&MissionParser::new().parse(text))?,
        ParseKind::Business => serde_json::to_string_pretty(&BusinessParser::new().parse(text, None))?,
    };
    println!("{}", json);
    Ok(())
}
