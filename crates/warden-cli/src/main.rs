use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use warden_core::app::{AppBuilder, PollPolicy, SubmitError};
use warden_core::config::AppConfig;
use warden_core::domain::{Backoff, MediaType, OperationCategory, PollProgress, TaskStatus};
use warden_core::error::WardenError;
use warden_core::impls::ScriptedTaskBackend;
use warden_core::observability::{DEFAULT_FILTER, init_tracing};

#[derive(Debug, Parser)]
#[command(name = "warden", about = "Secure artifact store, quotas and task polling")]
struct Cli {
    /// JSON config file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate and store an image, then print its metadata.
    Ingest { file: PathBuf },

    /// End-to-end run against a scripted task backend.
    Demo {
        /// Number of submissions to attempt (the default quota admits 5).
        #[arg(long, default_value_t = 6)]
        tasks: u32,

        /// Sub-second poll waits instead of the configured curve.
        #[arg(long)]
        fast: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_FILTER);
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading config")?;

    match cli.command {
        Command::Ingest { file } => ingest(config, file).await,
        Command::Demo { tasks, fast } => demo(config, tasks, fast).await,
    }
}

async fn ingest(config: AppConfig, file: PathBuf) -> Result<()> {
    let raw = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
    let app = AppBuilder::new(config).build()?;

    match app.ingest(&raw) {
        Ok(info) => {
            println!("{}", serde_json::to_string_pretty(&info)?);
            let verified = app.store().verify_integrity(info.id);
            println!("integrity: {}", if verified { "ok" } else { "FAILED" });
        }
        Err(WardenError::Rejected(rejection)) => {
            println!("rejected: {} ({:?})", rejection.user_message(), rejection.fallback());
        }
        Err(e) => return Err(e.into()),
    }

    let report = app.shutdown().await?;
    info!(deleted = report.deleted, "store purged on exit");
    Ok(())
}

async fn demo(mut config: AppConfig, tasks: u32, fast: bool) -> Result<()> {
    if fast {
        config.poll = PollPolicy {
            backoff: Backoff::new(Duration::from_millis(200), 1.5, Duration::from_secs(2)),
            ..config.poll
        };
    }

    let backend = Arc::new(ScriptedTaskBackend::new().on_submit([
        TaskStatus::Queued,
        TaskStatus::Running,
        TaskStatus::Running,
        TaskStatus::Completed,
    ]));
    let progress = |p: &PollProgress| match p.next_wait_secs {
        Some(wait) => println!(
            "  [{}] attempt {}/{} status={} next check in {:.1}s",
            p.task,
            p.attempt,
            p.max_attempts,
            p.status.as_ref().map_or("-", |s| s.as_str()),
            wait
        ),
        None => println!("  [{}] {:?} after {} attempt(s)", p.task, p.phase, p.attempt),
    };
    let app = AppBuilder::new(config)
        .with_backend(backend)
        .with_progress_sink(Arc::new(progress))
        .build()?;

    let store = app.store();
    let id = store
        .store_generated(b"generated circuit diagram", MediaType::Png)
        .context("storing generated artifact")?;
    println!("stored {id}; integrity verified: {}", store.verify_integrity(id));

    let prompt = app.sanitize("Explain <this> circuit; keep it short!");
    println!("sanitized prompt: {prompt:?}");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    let gateway = app.gateway().context("gateway not configured")?;
    for n in 1..=tasks {
        if cancel.is_cancelled() {
            break;
        }
        let request = serde_json::json!({ "demo": n, "prompt": prompt });
        match gateway.submit_and_wait(&request, &cancel).await {
            Ok((task, outcome)) => println!("{task}: {}", outcome.user_message()),
            Err(e @ SubmitError::RateLimited { .. }) => {
                println!("submission {n}: {}", e.user_message())
            }
            Err(e) => return Err(e.into()),
        }
    }

    for status in app.quotas().statuses() {
        let marker = if status.low { " (low)" } else { "" };
        println!("{status}{marker}");
    }
    if let Some(model) = app.quotas().status(&OperationCategory::model_invoke()) {
        info!(remaining = model.remaining, "model quota untouched by task submissions");
    }

    let report = app.shutdown().await?;
    println!("purged {} artifact(s) at shutdown", report.deleted);
    Ok(())
}
