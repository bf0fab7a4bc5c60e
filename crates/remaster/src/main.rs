//! remaster - re-voice MIDI files for retro console palettes
//!
//! Subcommands:
//! - `remaster styles` - List console styles and their programs
//! - `remaster classify <input>` - Show the role and program per channel
//! - `remaster remap <input> <output>` - Write a re-voiced MIDI file
//! - `remaster evaluate <reference> <candidate>` - Content-preservation metrics
//! - `remaster corpus <dir>` - Evaluate a directory for every style
//! - `remaster config` - Show the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remapconf::RemapConfig;
use remaster::{commands, corpus};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "remaster")]
#[command(about = "Re-voice General MIDI files for retro console palettes")]
#[command(version)]
struct Cli {
    /// Config file, used instead of ./remaster.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List console styles and their programs
    Styles,

    /// Classify each sounding channel of a MIDI file
    Classify {
        /// Input MIDI file
        input: PathBuf,

        /// Console style (defaults to config `defaults.style`)
        #[arg(short, long)]
        style: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Re-voice a MIDI file for a console style
    Remap {
        /// Input MIDI file
        input: PathBuf,

        /// Output MIDI file
        output: PathBuf,

        /// Console style (defaults to config `defaults.style`)
        #[arg(short, long)]
        style: Option<String>,
    },

    /// Compare a candidate MIDI file against a reference
    Evaluate {
        /// Reference MIDI file
        reference: PathBuf,

        /// Candidate MIDI file
        candidate: PathBuf,

        /// Onset tolerance in seconds (defaults to config `defaults.onset_tolerance`)
        #[arg(short, long)]
        tolerance: Option<f64>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Remap and evaluate every MIDI file under a directory
    Corpus {
        /// Directory searched recursively for .mid/.midi files
        dir: PathBuf,

        /// Styles to evaluate (default: all)
        #[arg(long, num_args = 1..)]
        styles: Vec<String>,

        /// Write per-run results as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Onset tolerance in seconds (defaults to config `defaults.onset_tolerance`)
        #[arg(short, long)]
        tolerance: Option<f64>,
    },

    /// Show the effective configuration and its sources
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = RemapConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.telemetry.log_level)
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(files = ?sources.files, env = ?sources.env_overrides, "loaded config");

    let catalogue = commands::build_catalogue(&config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Styles => {
            commands::styles(&catalogue, &mut out)?;
        }
        Commands::Classify { input, style, json } => {
            let style = style.unwrap_or_else(|| config.defaults.style.clone());
            let palette = catalogue.palette(&style)?;
            commands::classify(&input, palette, json, &mut out)?;
        }
        Commands::Remap {
            input,
            output,
            style,
        } => {
            let style = style.unwrap_or_else(|| config.defaults.style.clone());
            let palette = catalogue.palette(&style)?;
            commands::remap(&input, &output, &style, palette, &mut out)?;
        }
        Commands::Evaluate {
            reference,
            candidate,
            tolerance,
            json,
        } => {
            let tolerance =
                commands::validate_tolerance(tolerance.unwrap_or(config.defaults.onset_tolerance))?;
            commands::evaluate(&reference, &candidate, tolerance, json, &mut out)?;
        }
        Commands::Corpus {
            dir,
            styles,
            output,
            tolerance,
        } => {
            let tolerance =
                commands::validate_tolerance(tolerance.unwrap_or(config.defaults.onset_tolerance))?;
            let styles = if styles.is_empty() {
                catalogue.style_ids()
            } else {
                styles
            };

            let rows = corpus::run(&dir, &styles, &catalogue, tolerance)?;

            if let Some(path) = output {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                let mut file = std::fs::File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                corpus::write_csv(&rows, &mut file)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!(path = %path.display(), rows = rows.len(), "wrote results");
            }

            corpus::print_summary(&corpus::summarize(&rows, &styles), &mut out)?;
        }
        Commands::Config => {
            commands::config(&config, &sources, &mut out)?;
        }
    }

    Ok(())
}
