use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use activity_flow::{ActivityDetail, WorkflowDefinition, TERMINATE};

use crate::cli::parse_input_override;

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Workflow definition file (JSON)
    pub workflow: PathBuf,

    /// Input overrides applied before rendering, as key=value
    #[arg(long = "input", value_name = "KEY=VALUE")]
    pub inputs: Vec<String>,
}

/// Load a workflow definition, apply input overrides and print the rendered
/// oracle prompt for every activity. Loading is fail-fast, so an invalid
/// file reports its first violation and nothing runs.
pub async fn cmd_validate(args: ValidateArgs) -> Result<()> {
    let mut definition = WorkflowDefinition::from_file(&args.workflow)
        .with_context(|| format!("failed to load {}", args.workflow.display()))?;
    for raw in &args.inputs {
        let (key, value) = parse_input_override(raw)?;
        definition.set_input(key, value);
    }

    info!(
        activities = definition.len(),
        inputs = definition.inputs().len(),
        "workflow definition loaded"
    );

    for activity in definition.activities() {
        let target = match &activity.detail {
            ActivityDetail::Operation {
                next_activity_number,
            } => {
                if *next_activity_number == TERMINATE {
                    "terminate".to_string()
                } else {
                    format!("-> {next_activity_number}")
                }
            }
            ActivityDetail::Decision {
                next_activity_number_options,
                ..
            } => format!("-> one of {next_activity_number_options:?}"),
        };
        println!("activity {} ({target})", activity.number);
        for line in activity.to_oracle_prompt(definition.inputs()).lines() {
            println!("    {line}");
        }
    }

    println!(
        "OK: {} activities, starting at {}",
        definition.len(),
        definition
            .first_activity_number()
            .map(|n| n.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    Ok(())
}
