//! Workflow executor - walks the activity graph one oracle turn at a time.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use activity_sink::{ActivityKind, ActivitySink, NullSink};

use crate::definition::WorkflowDefinition;
use crate::errors::ExecError;
use crate::model::{Activity, ActivityDetail, TERMINATE};
use crate::oracle::{StepOracle, StepSignal};

/// Policy for cycles in the activity graph. A decision may legally point
/// back at an earlier activity; whether that is a feature or a
/// misconfiguration is the caller's call, so it is an explicit setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Looping is allowed, bounded by a global transition cap.
    Bounded { max_transitions: u32 },
    /// Revisiting any activity number terminates the run as a violation.
    Forbid,
}

impl Default for CyclePolicy {
    fn default() -> Self {
        CyclePolicy::Bounded {
            max_transitions: 1000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Retries granted when a decision answer falls outside the declared
    /// option set, beyond the first attempt.
    pub decision_retries: u32,
    pub cycle_policy: CyclePolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            decision_retries: 3,
            cycle_policy: CyclePolicy::default(),
        }
    }
}

/// Terminal state of a workflow run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Reached the terminate sentinel.
    Completed,
    /// Cancellation observed at a suspension point.
    Stopped,
    /// A contract violation or collaborator fault ended the run.
    Failed,
}

/// Outcome of one workflow run. Contract violations are carried in `error`
/// rather than bubbling out, so the visited path survives for reporting.
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub message: String,
    /// Activity numbers in visit order.
    pub path: Vec<i64>,
    /// Oracle turns consumed across all activities.
    pub oracle_turns: u32,
    pub error: Option<ExecError>,
}

impl RunOutcome {
    fn completed(path: Vec<i64>, oracle_turns: u32) -> Self {
        Self {
            status: RunStatus::Completed,
            message: "workflow terminated".into(),
            path,
            oracle_turns,
            error: None,
        }
    }

    fn stopped(path: Vec<i64>, oracle_turns: u32) -> Self {
        Self {
            status: RunStatus::Stopped,
            message: "workflow stopped".into(),
            path,
            oracle_turns,
            error: None,
        }
    }

    fn failed(error: ExecError, path: Vec<i64>, oracle_turns: u32) -> Self {
        Self {
            status: RunStatus::Failed,
            message: error.to_string(),
            path,
            oracle_turns,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Walks a workflow definition against a decision oracle.
///
/// The executor introduces no randomness: given the same definition and the
/// same sequence of oracle responses, the visited path is identical. Pause
/// and cancellation are observed between oracle turns, never mid-turn.
pub struct WorkflowExecutor {
    oracle: Arc<dyn StepOracle>,
    sink: Arc<dyn ActivitySink>,
    config: ExecutorConfig,
    cancel: CancellationToken,
    pause_rx: watch::Receiver<bool>,
    // Keeps the default gate's sender alive so `pause_rx` stays valid.
    _default_gate: Option<watch::Sender<bool>>,
}

impl WorkflowExecutor {
    pub fn new(oracle: Arc<dyn StepOracle>, config: ExecutorConfig) -> Self {
        let (pause_tx, pause_rx) = watch::channel(false);
        Self {
            oracle,
            sink: Arc::new(NullSink),
            config,
            cancel: CancellationToken::new(),
            pause_rx,
            _default_gate: Some(pause_tx),
        }
    }

    /// Cancellation token observed at suspension points. The owner of the
    /// token cancels from another task; the run ends with a Stopped outcome.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Pause gate: while the watched value is `true`, no new oracle turn
    /// starts. In-flight turns are never preempted.
    pub fn with_pause_gate(mut self, pause_rx: watch::Receiver<bool>) -> Self {
        self.pause_rx = pause_rx;
        self._default_gate = None;
        self
    }

    /// Sink receiving progress messages. Defaults to a null sink.
    pub fn with_sink(mut self, sink: Arc<dyn ActivitySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run the workflow from `start` until the terminate sentinel, a
    /// contract violation, or cancellation.
    pub async fn run(&self, definition: &WorkflowDefinition, start: i64) -> RunOutcome {
        let mut path: Vec<i64> = Vec::new();
        let mut oracle_turns: u32 = 0;
        let mut visited: HashSet<i64> = HashSet::new();
        let mut transitions: u32 = 0;
        let mut current = start;

        loop {
            let Some(activity) = definition.activity(current) else {
                let from = path.last().copied();
                return self
                    .fail(
                        ExecError::DanglingTransition { from, to: current },
                        path,
                        oracle_turns,
                    )
                    .await;
            };

            match self.config.cycle_policy {
                CyclePolicy::Forbid => {
                    if !visited.insert(current) {
                        return self
                            .fail(
                                ExecError::CycleDetected { activity: current },
                                path,
                                oracle_turns,
                            )
                            .await;
                    }
                }
                CyclePolicy::Bounded { max_transitions } => {
                    if transitions > max_transitions {
                        return self
                            .fail(
                                ExecError::TransitionCapExceeded {
                                    cap: max_transitions,
                                },
                                path,
                                oracle_turns,
                            )
                            .await;
                    }
                }
            }

            path.push(current);
            info!(activity = current, kind = activity.kind(), "entering activity");
            self.sink
                .send_activity(&activity.to_string(), ActivityKind::Action, None)
                .await;

            let prompt = activity.to_oracle_prompt(definition.inputs());

            // Per-activity step budget.
            let mut finished = false;
            for _ in 0..activity.max_steps {
                if !self.wait_while_paused().await {
                    return RunOutcome::stopped(path, oracle_turns);
                }
                match self.oracle.step(current, &prompt).await {
                    Ok(signal) => {
                        oracle_turns += 1;
                        if signal == StepSignal::FinishConditionMet {
                            finished = true;
                            break;
                        }
                    }
                    Err(source) => {
                        return self
                            .fail(
                                ExecError::OracleFault {
                                    activity: current,
                                    source,
                                },
                                path,
                                oracle_turns,
                            )
                            .await;
                    }
                }
            }
            if !finished {
                return self
                    .fail(
                        ExecError::StepBudgetExceeded {
                            activity: current,
                            max_steps: activity.max_steps,
                        },
                        path,
                        oracle_turns,
                    )
                    .await;
            }

            let next = match &activity.detail {
                ActivityDetail::Operation {
                    next_activity_number,
                } => *next_activity_number,
                ActivityDetail::Decision {
                    next_activity_number_options,
                    ..
                } => {
                    match self
                        .decide(activity, &prompt, next_activity_number_options, &mut oracle_turns)
                        .await
                    {
                        Ok(Some(next)) => next,
                        Ok(None) => return RunOutcome::stopped(path, oracle_turns),
                        Err(err) => return self.fail(err, path, oracle_turns).await,
                    }
                }
            };

            if next == TERMINATE {
                self.sink
                    .send_activity("Workflow terminated", ActivityKind::Result, None)
                    .await;
                return RunOutcome::completed(path, oracle_turns);
            }
            transitions += 1;
            current = next;
        }
    }

    /// Ask the oracle for a decision, enforcing the declared option set
    /// with a bounded retry. `Ok(None)` reports cancellation while waiting.
    /// Every decision answer counts as one oracle turn, retries included.
    async fn decide(
        &self,
        activity: &Activity,
        prompt: &str,
        options: &[i64],
        oracle_turns: &mut u32,
    ) -> Result<Option<i64>, ExecError> {
        let mut last_rejected = None;
        for attempt in 0..=self.config.decision_retries {
            if !self.wait_while_paused().await {
                return Ok(None);
            }
            let result = self
                .oracle
                .decide(activity.number, prompt, options)
                .await
                .map_err(|source| ExecError::OracleFault {
                    activity: activity.number,
                    source,
                })?;
            *oracle_turns += 1;
            if options.contains(&result.next_activity_number) {
                debug!(
                    activity = activity.number,
                    next = result.next_activity_number,
                    reason = %result.reason,
                    "decision accepted"
                );
                self.sink
                    .send_activity(&result.reason, ActivityKind::Thinking, None)
                    .await;
                return Ok(Some(result.next_activity_number));
            }
            warn!(
                activity = activity.number,
                chosen = result.next_activity_number,
                attempt,
                "decision answer outside the declared options, retrying"
            );
            last_rejected = Some(result.next_activity_number);
        }
        Err(ExecError::DecisionRejected {
            activity: activity.number,
            chosen: last_rejected.unwrap_or(TERMINATE),
            options: options.to_vec(),
        })
    }

    /// Block while the pause gate is closed. Returns `false` when the run
    /// was cancelled, either directly or while paused.
    async fn wait_while_paused(&self) -> bool {
        let mut pause_rx = self.pause_rx.clone();
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            if !*pause_rx.borrow() {
                return true;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                changed = pause_rx.changed() => {
                    // A dropped gate counts as resumed.
                    if changed.is_err() {
                        return true;
                    }
                }
            }
        }
    }

    async fn fail(&self, error: ExecError, path: Vec<i64>, oracle_turns: u32) -> RunOutcome {
        warn!(%error, "workflow run failed");
        self.sink
            .send_activity(&error.to_string(), ActivityKind::Result, None)
            .await;
        RunOutcome::failed(error, path, oracle_turns)
    }
}
