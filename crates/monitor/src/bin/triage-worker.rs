//! triage-worker: replays recorded sensor sessions through the triage board.
//!
//! Reads JSON-lines ingress records (see `triage_monitor::ingress`) from a
//! file or stdin, routes them to per-patient monitors and prints the final
//! ranking as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

use triage_core::config::load_dotenv;
use triage_core::sensor::LoggingSensorLink;
use triage_core::{Config, Roster};
use triage_monitor::{IngressRecord, TriageBoard};
use triage_notify::{spawn_delivery, Dispatcher, ReportTemplates, TemplateRenderer};

// ── CLI ─────────────────────────────────────────────────────────────

/// Triage worker. Ranks patients from replayed heart-rate sessions.
#[derive(Parser, Debug)]
#[command(name = "triage-worker", version, about)]
struct Cli {
    /// Roster file mapping device serials to patients.
    #[arg(long, env = "TRIAGE_ROSTER")]
    roster: Option<PathBuf>,

    /// JSON-lines ingress file, or `-` for stdin.
    #[arg(long, default_value = "-")]
    input: String,

    /// Keep running after the input ends until Ctrl-C.
    #[arg(long, default_value_t = false)]
    follow: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = cli.roster {
        config.roster.path = path;
    }
    config.validate()?;
    config.log_summary();

    let roster = Roster::load(&config.roster.path)?;

    let settle = config.monitor.evaluation_poll_interval() * 2;
    let renderer = Arc::new(TemplateRenderer::new());
    let dispatcher = Dispatcher::from_config(&config.notify, renderer.clone())?;
    let templates = ReportTemplates::from_config(&config.notify, &renderer)?;
    let (queue, delivery) =
        spawn_delivery(dispatcher, renderer, templates, config.notify.delivery_timeout());

    let mut board = TriageBoard::new(
        config,
        Arc::new(roster),
        Arc::new(LoggingSensorLink),
        Arc::new(queue),
    )?;

    let reader: Box<dyn AsyncRead + Unpin + Send> = if cli.input == "-" {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(tokio::fs::File::open(&cli.input).await?)
    };

    tokio::select! {
        result = replay(&mut board, reader) => {
            let applied = result?;
            info!(applied, "input exhausted");
            // Let evaluating patients reach their next ranking poll.
            tokio::time::sleep(settle).await;
            if cli.follow {
                tokio::signal::ctrl_c().await?;
                info!("received Ctrl-C");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    let ranked = board.ranked().await;
    println!("{}", serde_json::to_string_pretty(&ranked)?);

    // Dropping the board releases the last report queue, so delivery drains and ends.
    board.shutdown().await;
    if let Err(e) = delivery.await {
        warn!(error = %e, "report delivery task failed");
    }

    info!("triage worker stopped");
    Ok(())
}

/// Apply every record from `reader`. Malformed lines are logged and skipped.
async fn replay(
    board: &mut TriageBoard,
    reader: Box<dyn AsyncRead + Unpin + Send>,
) -> anyhow::Result<u64> {
    let mut lines = BufReader::new(reader).lines();
    let mut applied = 0u64;
    let mut line_no = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let record = match IngressRecord::parse_line(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping ingress line");
                continue;
            }
        };
        let device = record.device_id().to_string();
        if let Err(e) = record.apply(board).await {
            warn!(line = line_no, device = %device, error = %e, "ingress record rejected");
            continue;
        }
        applied += 1;
    }

    Ok(applied)
}
