mod config;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use logsink_ingress::{ChannelIngress, EnvelopeWriter};
use logsink_stream::LogStreamer;
use logsink_types::Tags;

use crate::config::{Config, Overrides, parse_tag};

/// Logsink - capture a workload's stdout and stderr as tagged log messages
#[derive(Parser, Debug)]
#[command(name = "logsink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file with guid, source, index, output and [tags]
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Workload guid (empty disables shipping)
    #[arg(long)]
    guid: Option<String>,

    /// Source name attached to every message
    #[arg(long)]
    source: Option<String>,

    /// Workload instance index
    #[arg(long, allow_hyphen_values = true)]
    index: Option<i32>,

    /// Extra tag, may be repeated
    #[arg(long = "tag", value_name = "KEY=VALUE")]
    tags: Vec<String>,

    /// Append JSON lines to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Command to run, followed by its arguments
    #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout may carry the JSON output, so diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => Err(e),
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let base = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let tags: Tags = args
        .tags
        .iter()
        .map(|t| parse_tag(t))
        .collect::<Result<_, _>>()?;

    Ok(base.merge(Overrides {
        guid: args.guid.clone(),
        source: args.source.clone(),
        index: args.index,
        output: args.output.clone(),
        tags,
    }))
}

async fn open_output(config: &Config) -> Result<Box<dyn AsyncWrite + Unpin + Send>> {
    match &config.output {
        Some(path) => {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("failed to open output {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Run the workload and return the exit code to report
async fn run_app(args: Args) -> Result<i32> {
    let config = load_config(&args)?;
    let (program, program_args) = args
        .command
        .split_first()
        .context("no command given")?;

    let cancel = CancellationToken::new();
    let (ingress, rx) = ChannelIngress::new();
    let writer = tokio::spawn(EnvelopeWriter::new(rx, open_output(&config).await?).run());

    let streamer = LogStreamer::new(
        cancel.clone(),
        config.guid.clone(),
        config.source.clone(),
        config.index,
        config.tags.clone(),
        Arc::new(ingress),
    );
    if !streamer.is_enabled() {
        tracing::warn!("no workload guid configured, output will not be shipped");
    }

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let status = runner::run(program, program_args, &streamer, cancel).await;
    ctrl_c.abort();

    // Dropping the last streamer closes the channel and lets the writer finish
    drop(streamer);
    let written = writer.await.context("envelope writer panicked")??;
    tracing::debug!(written, "all envelopes written");

    let status = status?;
    Ok(status.code().unwrap_or(1))
}
