//! Avatar Replay - Scripted Sessions Without a Backend
//!
//! Runs a JSON-lines script of user actions and backend events through the
//! avatar controller and prints the resulting state and the commands the
//! controller issued, as JSON on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Replay a script file
//! avatar-replay session.jsonl
//!
//! # From stdin, pretty-printed, at 150% scale
//! avatar-replay --pretty --scale 1.5 < session.jsonl
//!
//! # Verbose logging
//! RUST_LOG=debug avatar-replay session.jsonl
//! ```

mod replay;
mod script;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use avatar_conductor::{default_config_path, load_config_from_path, AvatarConfig, ConfigOverrides};

/// Avatar Replay - drive the avatar controller from a script
#[derive(Parser, Debug)]
#[command(name = "avatar-replay")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Script file (JSON lines); reads stdin when omitted or `-`
    #[arg(value_name = "SCRIPT")]
    script: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "AVATAR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// UI scale factor override
    #[arg(long, value_name = "FACTOR")]
    scale: Option<f64>,

    /// Request non-streamed responses
    #[arg(long)]
    no_stream: bool,

    /// Settle delay override in milliseconds
    #[arg(long, value_name = "MS")]
    settle_delay_ms: Option<u64>,

    /// Pretty-print the report
    #[arg(short = 'p', long)]
    pretty: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "AVATAR_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(scale) = self.scale {
            overrides = overrides.with_scale(scale);
        }
        if self.no_stream {
            overrides = overrides.with_stream(false);
        }
        if let Some(ms) = self.settle_delay_ms {
            overrides = overrides.with_settle_delay_ms(ms);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "avatar_replay={level},avatar_conductor={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration with CLI overrides applied on top
fn load(path: Option<PathBuf>, overrides: &ConfigOverrides) -> Result<AvatarConfig> {
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration after CLI overrides")?;
    Ok(config)
}

fn read_script(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display())),
        _ => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read script from stdin")?;
            Ok(input)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config_path = args.config.clone().or_else(default_config_path);
    let overrides = args.overrides();
    let config = load(config_path.clone(), &overrides)?;
    info!(
        source = %config.source(),
        path = ?config.config_file_path,
        "Configuration loaded"
    );

    let steps = script::parse_script(&read_script(args.script.as_ref())?)?;
    info!(steps = steps.len(), "Script parsed");

    let reload = || load(config_path.clone(), &overrides);
    let report = replay::run_script(&steps, config, reload).await?;

    let output = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{output}");

    Ok(())
}
