use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use clashprobe::RunOptions;

#[derive(Parser)]
#[command(
    name = "clashprobe",
    about = "Test proxy routes for AI and streaming service reachability through mihomo",
    version,
    long_about = None
)]
struct Cli {
    /// Subscription URL or local YAML file
    #[arg(short, long, env = "SUB_URL")]
    source: String,

    /// Directory for the detailed JSON report
    #[arg(short, long, default_value = "result")]
    output: PathBuf,

    /// Write the condensed per-route tag map to this path
    #[arg(long)]
    map_output: Option<PathBuf>,

    /// Path of the mihomo executable [default: mihomo.exe]
    #[arg(long)]
    mihomo: Option<PathBuf>,

    /// Number of workers, one mihomo process each [default: 5]
    #[arg(short, long)]
    workers: Option<usize>,

    /// TOML tuning file (falls back to $CLASHPROBE_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let opts = RunOptions {
        source: cli.source,
        output: cli.output,
        map_output: cli.map_output,
        mihomo: cli.mihomo,
        workers: cli.workers,
        config: cli.config,
    };

    tokio::select! {
        result = clashprobe::run(&opts) => {
            let report = result?;
            tracing::info!(
                total = report.total_nodes,
                tested = report.tested_nodes,
                success = report.success_nodes,
                "run complete"
            );
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, tearing down workers");
            bail!("interrupted");
        }
    }

    Ok(())
}
