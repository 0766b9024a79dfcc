//! Lifecycle actions - one command per operation.
//!
//! Each action carries its own precondition over the current status, its
//! side effect, and its status broadcast. Dispatch holds the session's
//! action lock for the whole command, so concurrent calls serialize into a
//! total order and no transition or broadcast is lost.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use activity_flow::{RunStatus, WorkflowExecutor};
use activity_sink::ActivityKind;
use huntr_core_types::BotStatus;

use crate::errors::LifecycleError;
use crate::session::{BotSession, WorkerHandle};

/// How long Stop waits for the worker to unwind before abandoning it.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Uniform result of every lifecycle action. Callers never receive a raw
/// fault from a lifecycle command.
#[derive(Clone, Debug, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    pub status: BotStatus,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>, status: BotStatus) -> Self {
        Self {
            success: true,
            message: message.into(),
            status,
        }
    }

    pub fn rejected(message: impl Into<String>, status: BotStatus) -> Self {
        Self {
            success: false,
            message: message.into(),
            status,
        }
    }
}

#[async_trait]
pub trait LifecycleAction: Send + Sync {
    fn name(&self) -> &'static str;

    /// Precondition over the current status. The error string becomes the
    /// rejection message; the status is left untouched.
    fn check(&self, status: BotStatus) -> Result<(), String>;

    /// Side effect plus status broadcast. Runs only after `check` passed,
    /// under the session's dispatch lock.
    async fn apply(&self, session: &Arc<BotSession>) -> Result<ActionResult, LifecycleError>;
}

/// Run one action against a session. Precondition failures and internal
/// faults both come back as a failed [`ActionResult`]; nothing is raised
/// past this boundary.
pub async fn dispatch(action: &dyn LifecycleAction, session: &Arc<BotSession>) -> ActionResult {
    let _guard = session.dispatch_lock.lock().await;
    let status = session.status();
    if let Err(reason) = action.check(status) {
        debug!(
            action = action.name(),
            %status,
            "precondition rejected: {reason}"
        );
        return ActionResult::rejected(reason, status);
    }
    match action.apply(session).await {
        Ok(result) => result,
        Err(err) => {
            error!(action = action.name(), "action failed: {err}");
            ActionResult::rejected(
                format!("{} failed: {err}", action.name()),
                session.status(),
            )
        }
    }
}

/// Start: spawn the worker task and allocate the browser session.
pub struct StartAction;

#[async_trait]
impl LifecycleAction for StartAction {
    fn name(&self) -> &'static str {
        "start"
    }

    fn check(&self, status: BotStatus) -> Result<(), String> {
        match status {
            BotStatus::Idle => Ok(()),
            BotStatus::Running | BotStatus::Paused => {
                Err("A session is already active for this workflow run".into())
            }
            BotStatus::Stopped | BotStatus::Error => {
                Err("This bot session already finished; start a new session".into())
            }
        }
    }

    async fn apply(&self, session: &Arc<BotSession>) -> Result<ActionResult, LifecycleError> {
        if session.has_worker() {
            return Err(LifecycleError::Internal(
                "a worker is already alive for this session".into(),
            ));
        }

        let cancel = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);

        session.set_status(BotStatus::Running);
        session
            .manager
            .send_status(BotStatus::Running, "Bot started in background")
            .await;

        let worker_session = session.clone();
        let worker_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            run_worker(worker_session, worker_cancel, pause_rx).await;
        });

        *session.worker.lock() = Some(WorkerHandle {
            join,
            cancel,
            pause_tx,
        });

        Ok(ActionResult::ok(
            "Bot started successfully in background",
            BotStatus::Running,
        ))
    }
}

/// Pause: stop new oracle/browser operations from starting. In-flight
/// operations finish; the browser session stays alive.
pub struct PauseAction;

#[async_trait]
impl LifecycleAction for PauseAction {
    fn name(&self) -> &'static str {
        "pause"
    }

    fn check(&self, status: BotStatus) -> Result<(), String> {
        match status {
            BotStatus::Running => Ok(()),
            other => Err(format!("Cannot pause a bot in status `{other}`")),
        }
    }

    async fn apply(&self, session: &Arc<BotSession>) -> Result<ActionResult, LifecycleError> {
        // The worker writes its terminal status outside the dispatch lock,
        // so the status seen by `check` may be stale by now. The
        // compare-and-set keeps a finished run from ending up Paused.
        if !session.transition_if(BotStatus::Running, BotStatus::Paused) {
            let status = session.status();
            return Ok(ActionResult::rejected(
                format!("Cannot pause a bot in status `{status}`"),
                status,
            ));
        }
        {
            let worker = session.worker.lock();
            let handle = worker.as_ref().ok_or_else(|| {
                LifecycleError::Internal("running session has no worker".into())
            })?;
            let _ = handle.pause_tx.send(true);
        }
        session
            .manager
            .send_status(BotStatus::Paused, "Bot paused")
            .await;
        Ok(ActionResult::ok("Bot paused", BotStatus::Paused))
    }
}

/// Resume: allow new operations to begin again.
pub struct ResumeAction;

#[async_trait]
impl LifecycleAction for ResumeAction {
    fn name(&self) -> &'static str {
        "resume"
    }

    fn check(&self, status: BotStatus) -> Result<(), String> {
        match status {
            BotStatus::Paused => Ok(()),
            other => Err(format!("Cannot resume a bot in status `{other}`")),
        }
    }

    async fn apply(&self, session: &Arc<BotSession>) -> Result<ActionResult, LifecycleError> {
        // Same stale-check hazard as Pause: a run can finish while paused
        // if the worker's last turn was already in flight.
        if !session.transition_if(BotStatus::Paused, BotStatus::Running) {
            let status = session.status();
            return Ok(ActionResult::rejected(
                format!("Cannot resume a bot in status `{status}`"),
                status,
            ));
        }
        {
            let worker = session.worker.lock();
            let handle = worker.as_ref().ok_or_else(|| {
                LifecycleError::Internal("paused session has no worker".into())
            })?;
            let _ = handle.pause_tx.send(false);
        }
        session
            .manager
            .send_status(BotStatus::Running, "Bot resumed")
            .await;
        Ok(ActionResult::ok("Bot resumed", BotStatus::Running))
    }
}

/// Stop: signal the worker to unwind and wait for it. The worker releases
/// the browser on its own task; this action never touches worker-owned
/// resources. Idempotent: stopping an idle or already-stopped bot is a
/// rejection with no side effects.
pub struct StopAction;

#[async_trait]
impl LifecycleAction for StopAction {
    fn name(&self) -> &'static str {
        "stop"
    }

    fn check(&self, status: BotStatus) -> Result<(), String> {
        match status {
            BotStatus::Running | BotStatus::Paused | BotStatus::Error => Ok(()),
            BotStatus::Idle | BotStatus::Stopped => {
                Err("No active session to stop".into())
            }
        }
    }

    async fn apply(&self, session: &Arc<BotSession>) -> Result<ActionResult, LifecycleError> {
        let handle = session.worker.lock().take();
        match handle {
            Some(handle) => {
                info!(bot = %session.id, "delivering stop to worker");
                let abort = handle.join.abort_handle();
                handle.cancel.cancel();
                match tokio::time::timeout(STOP_TIMEOUT, handle.join).await {
                    Ok(Ok(())) => {}
                    Ok(Err(join_err)) => {
                        warn!(bot = %session.id, "worker join failed: {join_err}");
                    }
                    Err(_) => {
                        warn!(bot = %session.id, "worker did not unwind in time, aborting");
                        abort.abort();
                    }
                }
            }
            None => {
                // Never started or already torn down: pure flag set, no
                // resource release attempted.
                debug!(bot = %session.id, "stop without a worker context");
            }
        }
        session.set_status(BotStatus::Stopped);
        session
            .manager
            .send_status(BotStatus::Stopped, "Bot stopped")
            .await;
        Ok(ActionResult::ok("Bot stopped", BotStatus::Stopped))
    }
}

/// Worker task body: allocate the browser, run the workflow, release the
/// browser, report the terminal status. Owns the browser session for its
/// whole life.
async fn run_worker(
    session: Arc<BotSession>,
    cancel: CancellationToken,
    pause_rx: watch::Receiver<bool>,
) {
    let manager = session.manager.clone();

    let mut browser = match session.browser_factory.open(&session.profile).await {
        Ok(browser) => browser,
        Err(err) => {
            error!(bot = %session.id, "browser allocation failed: {err}");
            session.set_status(BotStatus::Error);
            manager
                .send_status(BotStatus::Error, &format!("Failed to start bot: {err}"))
                .await;
            return;
        }
    };
    if let Err(err) = browser.start().await {
        error!(bot = %session.id, "browser start failed: {err}");
        session.set_status(BotStatus::Error);
        manager
            .send_status(BotStatus::Error, &format!("Failed to start bot: {err}"))
            .await;
        return;
    }

    if let Some(url) = &session.launch.starter_url {
        if let Err(err) = browser.navigate(url).await {
            error!(bot = %session.id, "starter navigation failed: {err}");
            if let Err(stop_err) = browser.stop().await {
                debug!("browser shutdown raised, ignoring: {stop_err}");
            }
            session.set_status(BotStatus::Error);
            manager
                .send_status(BotStatus::Error, &format!("Failed to start bot: {err}"))
                .await;
            return;
        }
    }
    if let Ok(url) = browser.current_url().await {
        session.set_current_url(url);
    }

    let executor = WorkflowExecutor::new(
        session.oracle.clone(),
        session.launch.executor_config.clone(),
    )
    .with_cancellation(cancel)
    .with_pause_gate(pause_rx)
    .with_sink(manager.clone());

    let outcome = executor
        .run(&session.launch.definition, session.launch.start_activity)
        .await;

    if let Ok(url) = browser.current_url().await {
        session.set_current_url(url);
    }
    // Best-effort release; stop-path browser faults are swallowed.
    if let Err(err) = browser.stop().await {
        debug!("browser shutdown raised, ignoring: {err}");
    }

    match outcome.status {
        RunStatus::Completed => {
            session.set_status(BotStatus::Stopped);
            manager
                .send_activity(
                    &format!("Workflow completed; visited {:?}", outcome.path),
                    ActivityKind::Result,
                    None,
                )
                .await;
            manager
                .send_status(BotStatus::Stopped, "Workflow completed")
                .await;
        }
        RunStatus::Failed => {
            session.set_status(BotStatus::Error);
            manager
                .send_status(BotStatus::Error, &outcome.message)
                .await;
        }
        // Cancellation: the Stop action owns the final transition and
        // broadcast; the worker just unwinds.
        RunStatus::Stopped => {
            info!(bot = %session.id, "worker unwound after stop signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::NullBrowserFactory;
    use crate::session::LaunchSpec;
    use activity_flow::{ExecutorConfig, ScriptedOracle, WorkflowDefinition};
    use activity_sink::{BufferedSink, SinkMessage};
    use huntr_core_types::WorkflowRunId;

    fn session_with_sink(sink: Arc<BufferedSink>) -> Arc<BotSession> {
        let json = r#"{
            "activities": [
                {
                    "activity_number": 0,
                    "activity_type": "operation",
                    "instruction": "Open the listing",
                    "finish_condition": "The listing page is visible",
                    "next_activity_number": -1
                }
            ]
        }"#;
        BotSession::new(
            WorkflowRunId::from("run-a"),
            LaunchSpec {
                platform: "indeed".into(),
                user_id: "u1".into(),
                definition: Arc::new(WorkflowDefinition::from_json_str(json).unwrap()),
                start_activity: 0,
                starter_url: None,
                executor_config: ExecutorConfig::default(),
            },
            Arc::new(ScriptedOracle::new([])),
            NullBrowserFactory::new(),
            sink,
        )
    }

    #[test]
    fn start_precondition_over_every_status() {
        assert!(StartAction.check(BotStatus::Idle).is_ok());
        for status in [
            BotStatus::Running,
            BotStatus::Paused,
            BotStatus::Stopped,
            BotStatus::Error,
        ] {
            assert!(StartAction.check(status).is_err(), "{status}");
        }
    }

    #[test]
    fn pause_only_from_running_resume_only_from_paused() {
        assert!(PauseAction.check(BotStatus::Running).is_ok());
        assert!(PauseAction.check(BotStatus::Paused).is_err());
        assert!(ResumeAction.check(BotStatus::Paused).is_ok());
        assert!(ResumeAction.check(BotStatus::Running).is_err());
    }

    #[test]
    fn stop_accepts_errored_sessions() {
        assert!(StopAction.check(BotStatus::Error).is_ok());
        assert!(StopAction.check(BotStatus::Idle).is_err());
        assert!(StopAction.check(BotStatus::Stopped).is_err());
    }

    #[tokio::test]
    async fn dispatch_rejection_leaves_status_untouched() {
        let sink = BufferedSink::new();
        let session = session_with_sink(sink.clone());
        let result = dispatch(&PauseAction, &session).await;
        assert!(!result.success);
        assert_eq!(result.status, BotStatus::Idle);
        assert_eq!(session.status(), BotStatus::Idle);
        assert!(sink.drain().is_empty(), "rejections broadcast nothing");
    }

    #[tokio::test]
    async fn pause_cannot_override_a_finished_run() {
        // Models the worker reaching a terminal status after Pause's
        // precondition check but before its side effect.
        let sink = BufferedSink::new();
        let session = session_with_sink(sink.clone());
        session.set_status(BotStatus::Stopped);

        let result = PauseAction.apply(&session).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.status, BotStatus::Stopped);
        assert_eq!(session.status(), BotStatus::Stopped);
        assert!(sink.drain().is_empty());
    }

    #[tokio::test]
    async fn resume_cannot_override_a_finished_run() {
        let sink = BufferedSink::new();
        let session = session_with_sink(sink.clone());
        session.set_status(BotStatus::Error);

        let result = ResumeAction.apply(&session).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.status, BotStatus::Error);
        assert_eq!(session.status(), BotStatus::Error);
    }

    #[tokio::test]
    async fn stop_without_worker_still_broadcasts_stopped() {
        let sink = BufferedSink::new();
        let session = session_with_sink(sink.clone());
        session.set_status(BotStatus::Error);

        let result = dispatch(&StopAction, &session).await;
        assert!(result.success);
        assert_eq!(session.status(), BotStatus::Stopped);
        let messages = sink.drain();
        assert!(messages.iter().any(|msg| matches!(
            msg,
            SinkMessage::StatusUpdate { status, .. } if *status == BotStatus::Stopped
        )));
    }
}
