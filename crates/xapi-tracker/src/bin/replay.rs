//! xapi-replay: drive a tracker session against a real LRS from a script
//!
//! A script is a JSON document holding the course nodes and the steps to
//! play:
//!
//! ```json
//! {
//!   "course": [{"id": "course", "kind": "course", "title": "Safety"}],
//!   "steps": [
//!     {"step": "data_ready"},
//!     {"step": "event", "event": {"type": "page_visited", "node_id": "co-1"}},
//!     {"step": "visibility", "visible": false},
//!     {"step": "unload"}
//!   ]
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use xapi_tracker::{ContentNode, CourseTree, DomainEvent, HttpTransport, Tracker, TrackerConfig};

#[derive(Parser)]
#[command(name = "xapi-replay")]
#[command(about = "Replay a scripted course session against an LRS")]
struct Cli {
    /// Path to tracker configuration
    #[arg(short, long, default_value = "xapi-tracker.toml", env = "XAPI_TRACKER_CONFIG")]
    config: PathBuf,

    /// Script to play
    script: PathBuf,

    /// Keep going after a failed step
    #[arg(long)]
    keep_going: bool,
}

#[derive(Deserialize)]
struct Script {
    course: Vec<ContentNode>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
enum Step {
    DataReady,
    Visibility { visible: bool },
    Unload,
    Event { event: DomainEvent },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("xapi_tracker=info".parse()?)
                .add_directive("lrs_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let started = chrono::Utc::now();

    let config = TrackerConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let raw = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("reading {}", cli.script.display()))?;
    let script: Script = serde_json::from_str(&raw).context("parsing script")?;

    let transport = HttpTransport::from_config(&config)?;
    let tree = Arc::new(CourseTree::from_nodes(script.course)?);
    let tracker = Tracker::builder(Arc::new(config), Arc::new(transport), tree.clone())
        .with_restorer(tree)
        .build();

    let mut signals = tracker.subscribe();
    let log_signals = tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Ok(signal) => info!(signal = ?signal, "Tracker signal"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Signal log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!(steps = script.steps.len(), "Replaying script");
    let mut failed = 0usize;
    for (index, step) in script.steps.into_iter().enumerate() {
        let outcome = match step {
            Step::DataReady => tracker.data_ready().await,
            Step::Visibility { visible } => tracker.visibility_changed(visible).await,
            Step::Unload => tracker.unload().await,
            Step::Event { event } => tracker.dispatch(event).await,
        };

        if let Err(e) = outcome {
            failed += 1;
            warn!(step = index, error = %e, "Step failed");
            if !cli.keep_going {
                break;
            }
        }
    }

    drop(tracker);
    log_signals.abort();

    let elapsed = chrono::Utc::now() - started;
    info!(
        failed,
        elapsed_ms = elapsed.num_milliseconds(),
        "Replay finished"
    );

    if failed > 0 {
        anyhow::bail!("{failed} step(s) failed");
    }
    Ok(())
}
