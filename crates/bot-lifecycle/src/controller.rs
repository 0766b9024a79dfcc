//! Controller registry: one bot session per workflow run.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{info, warn};

use activity_flow::{ExecutorConfig, StepOracle, WorkflowDefinition};
use activity_sink::ActivitySink;
use huntr_core_types::{BotStatus, WorkflowRunId};

use crate::actions::{
    dispatch, ActionResult, PauseAction, ResumeAction, StartAction, StopAction,
};
use crate::browser::BrowserFactory;
use crate::session::{BotSession, LaunchSpec, SessionSnapshot};

/// Everything Start needs beyond what the controller already holds.
pub struct StartRequest {
    pub platform: String,
    pub user_id: String,
    pub definition: Arc<WorkflowDefinition>,
    /// Defaults to the definition's lowest activity number.
    pub start_activity: Option<i64>,
    pub starter_url: Option<String>,
    pub executor_config: ExecutorConfig,
}

/// Owns every live bot session, keyed by workflow run. Stopped and errored
/// sessions stay registered until a new Start replaces them, so repeated
/// Stop calls keep reporting the terminal status instead of "not found".
pub struct BotController {
    oracle: Arc<dyn StepOracle>,
    browser_factory: Arc<dyn BrowserFactory>,
    sink: Arc<dyn ActivitySink>,
    sessions: DashMap<WorkflowRunId, Arc<BotSession>>,
}

impl BotController {
    pub fn new(
        oracle: Arc<dyn StepOracle>,
        browser_factory: Arc<dyn BrowserFactory>,
        sink: Arc<dyn ActivitySink>,
    ) -> Self {
        Self {
            oracle,
            browser_factory,
            sink,
            sessions: DashMap::new(),
        }
    }

    /// Start a bot for `run_id`. A run with an active session is rejected;
    /// a finished session is replaced by a fresh one.
    pub async fn start(&self, run_id: WorkflowRunId, request: StartRequest) -> ActionResult {
        let start_activity = match request.start_activity {
            Some(number) => number,
            None => match request.definition.first_activity_number() {
                Some(number) => number,
                None => {
                    return ActionResult::rejected(
                        "Workflow has no activities to run",
                        BotStatus::Idle,
                    );
                }
            },
        };

        let session = BotSession::new(
            run_id.clone(),
            LaunchSpec {
                platform: request.platform,
                user_id: request.user_id,
                definition: request.definition,
                start_activity,
                starter_url: request.starter_url,
                executor_config: request.executor_config,
            },
            self.oracle.clone(),
            self.browser_factory.clone(),
            self.sink.clone(),
        );

        // Check and register under one entry guard: two concurrent Starts
        // for the same run must never both claim the slot. An Idle entry
        // means another Start holds the slot mid-dispatch and counts as
        // active here.
        match self.sessions.entry(run_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let status = occupied.get().status();
                if !matches!(status, BotStatus::Stopped | BotStatus::Error) {
                    return ActionResult::rejected(
                        "A session is already active for this workflow run",
                        status,
                    );
                }
                occupied.insert(session.clone());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(session.clone());
            }
        }
        info!(run = %run_id, bot = %session.id, "starting bot session");

        let result = dispatch(&StartAction, &session).await;
        if !result.success {
            warn!(run = %run_id, "start failed, releasing session slot");
            self.sessions
                .remove_if(&run_id, |_, current| Arc::ptr_eq(current, &session));
        }
        result
    }

    pub async fn pause(&self, run_id: &WorkflowRunId) -> ActionResult {
        self.act(run_id, &PauseAction).await
    }

    pub async fn resume(&self, run_id: &WorkflowRunId) -> ActionResult {
        self.act(run_id, &ResumeAction).await
    }

    pub async fn stop(&self, run_id: &WorkflowRunId) -> ActionResult {
        self.act(run_id, &StopAction).await
    }

    pub fn status(&self, run_id: &WorkflowRunId) -> Option<SessionSnapshot> {
        self.sessions.get(run_id).map(|session| session.snapshot())
    }

    pub fn status_all(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect()
    }

    pub fn session(&self, run_id: &WorkflowRunId) -> Option<Arc<BotSession>> {
        self.sessions.get(run_id).map(|entry| entry.value().clone())
    }

    /// Stop every session that still has a worker. Used at shutdown.
    pub async fn stop_all(&self) {
        let runs: Vec<WorkflowRunId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().status().is_active())
            .map(|entry| entry.key().clone())
            .collect();
        for run_id in runs {
            let result = self.stop(&run_id).await;
            if !result.success {
                warn!(run = %run_id, "shutdown stop rejected: {}", result.message);
            }
        }
    }

    /// Drop finished sessions from the registry. Idle sessions belong to a
    /// Start still in flight and are kept.
    pub fn cleanup(&self) {
        self.sessions.retain(|_, session| {
            let status = session.status();
            status.is_active() || status == BotStatus::Idle || session.has_worker()
        });
    }

    async fn act(&self, run_id: &WorkflowRunId, action: &dyn crate::actions::LifecycleAction) -> ActionResult {
        match self.session(run_id) {
            Some(session) => dispatch(action, &session).await,
            None => ActionResult::rejected(
                "No active bot found for this workflow run",
                BotStatus::Idle,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::NullBrowserFactory;
    use activity_flow::{ScriptedOracle, ScriptedResponse};
    use activity_sink::BufferedSink;

    fn two_step_definition() -> Arc<WorkflowDefinition> {
        let json = r#"{
            "inputs": {},
            "activities": [
                {
                    "activity_number": 0,
                    "activity_type": "operation",
                    "instruction": "Open the listing",
                    "finish_condition": "The listing page is visible",
                    "next_activity_number": 1
                },
                {
                    "activity_number": 1,
                    "activity_type": "operation",
                    "instruction": "Submit the application",
                    "finish_condition": "A confirmation appears",
                    "next_activity_number": -1
                }
            ]
        }"#;
        Arc::new(WorkflowDefinition::from_json_str(json).unwrap())
    }

    fn finishing_oracle() -> Arc<ScriptedOracle> {
        Arc::new(ScriptedOracle::new([
            ScriptedResponse::Finished,
            ScriptedResponse::Finished,
        ]))
    }

    fn request(definition: Arc<WorkflowDefinition>) -> StartRequest {
        StartRequest {
            platform: "indeed".into(),
            user_id: "u1".into(),
            definition,
            start_activity: None,
            starter_url: Some("https://indeed.test/jobs".into()),
            executor_config: ExecutorConfig::default(),
        }
    }

    async fn wait_until_finished(controller: &BotController, run_id: &WorkflowRunId) {
        for _ in 0..200 {
            let snapshot = controller.status(run_id).expect("session registered");
            if !snapshot.is_running && !snapshot.has_worker {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("bot did not finish in time");
    }

    #[tokio::test]
    async fn start_runs_workflow_to_completion() {
        let factory = NullBrowserFactory::new();
        let sink = BufferedSink::new();
        let controller = BotController::new(finishing_oracle(), factory.clone(), sink.clone());
        let run_id = WorkflowRunId::from("run-complete");

        let result = controller
            .start(run_id.clone(), request(two_step_definition()))
            .await;
        assert!(result.success, "{}", result.message);
        assert_eq!(result.status, BotStatus::Running);

        wait_until_finished(&controller, &run_id).await;
        let snapshot = controller.status(&run_id).unwrap();
        assert_eq!(snapshot.status, BotStatus::Stopped);

        let states = factory.sessions();
        assert_eq!(states.len(), 1);
        let state = states[0].lock();
        assert!(state.stopped, "browser must be released after the run");
        assert_eq!(state.visited, vec!["https://indeed.test/jobs".to_string()]);
    }

    #[tokio::test]
    async fn second_start_on_active_run_is_rejected() {
        let factory = NullBrowserFactory::new();
        let oracle = LatchOracle::new();
        let controller = BotController::new(oracle.clone(), factory, BufferedSink::new());
        let run_id = WorkflowRunId::from("run-dup");

        let first = controller
            .start(run_id.clone(), request(two_step_definition()))
            .await;
        assert!(first.success);

        let second = controller
            .start(run_id.clone(), request(two_step_definition()))
            .await;
        assert!(!second.success);
        assert_eq!(
            second.message,
            "A session is already active for this workflow run"
        );

        oracle.release();
        controller.stop_all().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_admit_exactly_one_session() {
        let factory = NullBrowserFactory::new();
        let oracle = LatchOracle::new();
        let controller = Arc::new(BotController::new(
            oracle.clone(),
            factory.clone(),
            BufferedSink::new(),
        ));
        let run_id = WorkflowRunId::from("run-race");

        let mut starts = Vec::new();
        for _ in 0..8 {
            let controller = controller.clone();
            let run_id = run_id.clone();
            starts.push(tokio::spawn(async move {
                controller
                    .start(run_id, request(two_step_definition()))
                    .await
            }));
        }
        let mut admitted = 0;
        for handle in starts {
            let result = handle.await.unwrap();
            if result.success {
                admitted += 1;
            } else {
                assert_eq!(
                    result.message,
                    "A session is already active for this workflow run"
                );
            }
        }
        assert_eq!(admitted, 1, "exactly one start may claim the run");

        oracle.release();
        controller.stop_all().await;
        // Only the admitted session may have opened a browser.
        assert_eq!(factory.sessions().len(), 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let factory = NullBrowserFactory::new();
        let sink = BufferedSink::new();
        let controller = BotController::new(finishing_oracle(), factory, sink);
        let run_id = WorkflowRunId::from("run-stop");

        controller
            .start(run_id.clone(), request(two_step_definition()))
            .await;
        let first = controller.stop(&run_id).await;
        // The workflow may have already completed on its own; either way
        // the session is Stopped afterwards.
        assert_eq!(controller.status(&run_id).unwrap().status, BotStatus::Stopped);

        let second = controller.stop(&run_id).await;
        assert!(!second.success);
        assert_eq!(second.status, BotStatus::Stopped);
        assert_eq!(second.message, "No active session to stop");
        let _ = first;
    }

    #[tokio::test]
    async fn stop_without_session_reports_not_found() {
        let controller = BotController::new(
            finishing_oracle(),
            NullBrowserFactory::new(),
            BufferedSink::new(),
        );
        let result = controller.stop(&WorkflowRunId::from("missing")).await;
        assert!(!result.success);
        assert_eq!(result.message, "No active bot found for this workflow run");
        assert_eq!(result.status, BotStatus::Idle);
    }

    #[tokio::test]
    async fn finished_session_is_replaced_on_restart() {
        let factory = NullBrowserFactory::new();
        let sink = BufferedSink::new();
        let oracle = Arc::new(ScriptedOracle::new([
            ScriptedResponse::Finished,
            ScriptedResponse::Finished,
            ScriptedResponse::Finished,
            ScriptedResponse::Finished,
        ]));
        let controller = BotController::new(oracle, factory, sink);
        let run_id = WorkflowRunId::from("run-again");

        controller
            .start(run_id.clone(), request(two_step_definition()))
            .await;
        wait_until_finished(&controller, &run_id).await;
        let first_bot = controller.status(&run_id).unwrap().bot_id;

        let restart = controller
            .start(run_id.clone(), request(two_step_definition()))
            .await;
        assert!(restart.success, "{}", restart.message);
        let second_bot = controller.status(&run_id).unwrap().bot_id;
        assert_ne!(first_bot, second_bot);

        wait_until_finished(&controller, &run_id).await;
        controller.cleanup();
        assert!(controller.status(&run_id).is_none());
    }

    /// Works forever until `finish` is raised; every turn yields so the
    /// pause gate gets a chance to latch between turns.
    struct LatchOracle {
        finish: std::sync::atomic::AtomicBool,
    }

    impl LatchOracle {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                finish: std::sync::atomic::AtomicBool::new(false),
            })
        }

        fn release(&self) {
            self.finish.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl activity_flow::StepOracle for LatchOracle {
        async fn step(
            &self,
            _activity_number: i64,
            _prompt: &str,
        ) -> Result<activity_flow::StepSignal, activity_flow::OracleError> {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            if self.finish.load(std::sync::atomic::Ordering::SeqCst) {
                Ok(activity_flow::StepSignal::FinishConditionMet)
            } else {
                Ok(activity_flow::StepSignal::Working)
            }
        }

        async fn decide(
            &self,
            activity_number: i64,
            _prompt: &str,
            _options: &[i64],
        ) -> Result<activity_flow::DecisionResult, activity_flow::OracleError> {
            Err(activity_flow::OracleError::Fault(format!(
                "activity {activity_number}: no decisions in this script"
            )))
        }
    }

    #[tokio::test]
    async fn pause_then_resume_round_trip() {
        let factory = NullBrowserFactory::new();
        let sink = BufferedSink::new();
        let oracle = LatchOracle::new();
        let controller = BotController::new(oracle.clone(), factory, sink);
        let run_id = WorkflowRunId::from("run-pause");

        controller
            .start(run_id.clone(), request(two_step_definition()))
            .await;

        let paused = controller.pause(&run_id).await;
        assert!(paused.success, "{}", paused.message);
        assert_eq!(paused.status, BotStatus::Paused);

        let resumed = controller.resume(&run_id).await;
        assert!(resumed.success, "{}", resumed.message);
        assert_eq!(resumed.status, BotStatus::Running);

        oracle.release();
        wait_until_finished(&controller, &run_id).await;
        assert_eq!(controller.status(&run_id).unwrap().status, BotStatus::Stopped);
    }

    #[tokio::test]
    async fn resume_on_running_bot_is_rejected() {
        let factory = NullBrowserFactory::new();
        let oracle = LatchOracle::new();
        let controller = BotController::new(oracle, factory, BufferedSink::new());
        let run_id = WorkflowRunId::from("run-resume");

        controller
            .start(run_id.clone(), request(two_step_definition()))
            .await;
        let result = controller.resume(&run_id).await;
        assert!(!result.success);
        assert_eq!(result.status, BotStatus::Running);
        controller.stop_all().await;
    }
}
