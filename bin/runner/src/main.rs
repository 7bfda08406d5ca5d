//! Headless canvasflow runner.
//!
//! Loads a workflow document, validates it, submits it to the engine and
//! replays the per-node results on the terminal.

mod config;
mod error;

use canvasflow_workflow::{
    EditorSession, FileStore, FixedDelay, HttpEngine, KeyValueStore, NoDelay, NodeId,
    NodeTypeCatalog, NotificationLevel, Pacer, Reply, RunOutcome, RunPhase,
};
use clap::Parser;
use crate::config::RunnerConfig;
use crate::error::RunnerError;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "canvasflow-runner", version, about = "Run a canvasflow workflow document")]
struct Args {
    /// Workflow document to load.
    file: PathBuf,

    /// Run from the chat trigger with this message instead of the manual trigger.
    #[arg(long, conflicts_with = "test_node")]
    chat: Option<String>,

    /// Test a single node in isolation.
    #[arg(long)]
    test_node: Option<String>,

    /// Only validate; do not execute.
    #[arg(long)]
    validate_only: bool,

    /// Skip the pause between replayed nodes.
    #[arg(long)]
    no_delay: bool,

    /// Write the workspace, without credentials, to this file afterwards.
    #[arg(long)]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(report) => {
            tracing::error!(error = %report, "Runner failed");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the workflow succeeded.
async fn run(args: Args) -> canvasflow_core::Result<bool, RunnerError> {
    let config = RunnerConfig::from_env().map_err(|e| RunnerError::Config {
        details: e.to_string(),
    })?;
    tracing::info!(engine = %config.engine.base_url, "Loaded configuration");

    let engine = HttpEngine::new(&config.engine).map_err(|e| RunnerError::Engine {
        details: e.current_context().to_string(),
    })?;
    let store = FileStore::open(&config.store_dir).map_err(|e| RunnerError::Store {
        details: e.to_string(),
    })?;
    let store: Arc<dyn KeyValueStore> = Arc::new(store);
    let pacer: Arc<dyn Pacer> = if args.no_delay {
        Arc::new(NoDelay)
    } else {
        Arc::new(FixedDelay::from_millis(config.replay.delay_ms))
    };
    let session = EditorSession::new(
        engine,
        store,
        Arc::new(NodeTypeCatalog::builtin()),
        pacer,
        config.orchestrator_settings(),
    );

    let mut notifications = session.notifications().subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            match notification.level {
                NotificationLevel::Error => tracing::error!("{}", notification.message),
                NotificationLevel::Warning => tracing::warn!("{}", notification.message),
                NotificationLevel::Info | NotificationLevel::Success => {
                    tracing::info!("{}", notification.message);
                }
            }
        }
    });

    let raw = std::fs::read_to_string(&args.file).map_err(|e| RunnerError::ReadDocument {
        path: args.file.clone(),
        details: e.to_string(),
    })?;
    let summary = session.import(&raw).map_err(|e| RunnerError::Import {
        details: e.to_string(),
    })?;
    tracing::info!(
        file = %args.file.display(),
        nodes = summary.nodes,
        edges = summary.edges,
        "Loaded workflow"
    );

    let stop = session.orchestrator().stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Stopping after the current node");
            stop.request_stop();
        }
    });

    let succeeded = if args.validate_only {
        validate(&session).await
    } else if let Some(node_id) = &args.test_node {
        match session.test_node(&NodeId::from(node_id.as_str())).await {
            Ok(outcome) => {
                println!("{}", outcome.output);
                outcome.error.is_none()
            }
            Err(e) => {
                tracing::error!(error = %e, "Node test failed");
                false
            }
        }
    } else {
        let result = match &args.chat {
            Some(message) => session.run_chat(message.clone()).await,
            None => session.run_manual().await,
        };
        match result {
            Ok(outcome) => report(&outcome),
            Err(e) => {
                tracing::error!(error = %e, "Run failed");
                false
            }
        }
    };

    if let Some(path) = &args.export {
        let export_error = |details: String| RunnerError::Export {
            path: path.clone(),
            details,
        };
        let exported = session.export(true).map_err(|e| export_error(e.to_string()))?;
        std::fs::write(path, exported).map_err(|e| export_error(e.to_string()))?;
        tracing::info!(file = %path.display(), "Exported workflow");
    }

    Ok(succeeded)
}

async fn validate(session: &EditorSession<HttpEngine>) -> bool {
    if let Err(e) = session.orchestrator().validate() {
        tracing::error!(error = %e, "Local validation failed");
        return false;
    }
    match session.orchestrator().validate_remotely().await {
        Ok(report) => {
            for warning in &report.warnings {
                tracing::warn!(warning = %warning, "Engine validation warning");
            }
            for error in &report.errors {
                tracing::error!(error = %error, "Engine validation error");
            }
            report.valid
        }
        Err(e) => {
            tracing::error!(error = %e, "Engine validation failed");
            false
        }
    }
}

fn report(outcome: &RunOutcome) -> bool {
    tracing::info!(
        run_id = %outcome.run_id,
        phase = ?outcome.phase,
        nodes = outcome.replayed.len(),
        "Run finished"
    );
    match &outcome.reply {
        Reply::Text(text) => println!("{text}"),
        Reply::Empty => tracing::info!("Workflow produced no reply"),
        Reply::NoRespondSink => {}
    }
    outcome.phase == RunPhase::Completed
}
