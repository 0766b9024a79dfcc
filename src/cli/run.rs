use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use tracing::{debug, info};

use activity_flow::{ExecutorConfig, ScriptedOracle, WorkflowDefinition};
use activity_sink::{BufferedSink, SinkMessage};
use bot_lifecycle::{BotController, NullBrowserFactory, StartRequest};
use huntr_core_types::{BotStatus, WorkflowRunId};

use crate::cli::parse_input_override;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Workflow definition file (JSON)
    pub workflow: PathBuf,

    /// Scripted oracle responses (JSON array), consumed in order
    #[arg(long, value_name = "FILE")]
    pub script: PathBuf,

    /// Activity number to start from (defaults to the lowest)
    #[arg(long)]
    pub start: Option<i64>,

    /// Platform label used in the bot id
    #[arg(long, default_value = "generic")]
    pub platform: String,

    /// User the browser profile is keyed by
    #[arg(long, default_value = "local")]
    pub user: String,

    /// URL opened before the workflow starts
    #[arg(long)]
    pub starter_url: Option<String>,

    /// Input overrides applied before rendering, as key=value
    #[arg(long = "input", value_name = "KEY=VALUE")]
    pub inputs: Vec<String>,
}

/// Run a workflow offline: scripted oracle, no real browser. Progress
/// messages stream to stdout as the worker emits them.
pub async fn cmd_run(args: RunArgs) -> Result<()> {
    let mut definition = WorkflowDefinition::from_file(&args.workflow)
        .with_context(|| format!("failed to load {}", args.workflow.display()))?;
    for raw in &args.inputs {
        let (key, value) = parse_input_override(raw)?;
        definition.set_input(key, value);
    }

    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read {}", args.script.display()))?;
    let oracle = Arc::new(
        ScriptedOracle::from_json_str(&script)
            .with_context(|| format!("invalid oracle script {}", args.script.display()))?,
    );

    let sink = BufferedSink::new();
    let controller = BotController::new(oracle, NullBrowserFactory::new(), sink.clone());
    let run_id = WorkflowRunId::new();
    info!(run = %run_id, "starting offline workflow run");

    let started = controller
        .start(
            run_id.clone(),
            StartRequest {
                platform: args.platform,
                user_id: args.user,
                definition: Arc::new(definition),
                start_activity: args.start,
                starter_url: args.starter_url,
                executor_config: ExecutorConfig::default(),
            },
        )
        .await;
    if !started.success {
        bail!("start rejected: {}", started.message);
    }

    let final_status = loop {
        for message in sink.drain() {
            print_message(&message);
        }
        let snapshot = controller
            .status(&run_id)
            .context("session vanished while running")?;
        if !snapshot.is_running && !snapshot.has_worker {
            break snapshot.status;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    for message in sink.drain() {
        print_message(&message);
    }

    debug!(%final_status, "run finished");
    match final_status {
        BotStatus::Stopped => Ok(()),
        other => bail!("workflow ended in status `{other}`"),
    }
}

fn print_message(message: &SinkMessage) {
    match message {
        SinkMessage::Activity {
            message,
            activity_kind,
            ..
        } => println!("[{}] {message}", activity_kind.as_str()),
        SinkMessage::StatusUpdate {
            status, message, ..
        } => println!("[status:{status}] {message}"),
    }
}
