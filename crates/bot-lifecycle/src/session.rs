//! Bot session state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use activity_flow::{ExecutorConfig, StepOracle, WorkflowDefinition};
use activity_sink::{ActivityManager, ActivitySink};
use huntr_core_types::{BotId, BotStatus, WorkflowRunId};

use crate::browser::{BrowserFactory, BrowserProfile};

/// Everything a worker needs to run one workflow.
pub struct LaunchSpec {
    pub platform: String,
    pub user_id: String,
    pub definition: Arc<WorkflowDefinition>,
    pub start_activity: i64,
    pub starter_url: Option<String>,
    pub executor_config: ExecutorConfig,
}

/// Handle over the worker task. Owned by the session's worker slot; Stop
/// takes it out to cancel and join.
pub(crate) struct WorkerHandle {
    pub(crate) join: JoinHandle<()>,
    pub(crate) cancel: CancellationToken,
    pub(crate) pause_tx: watch::Sender<bool>,
}

/// One bot instance bound to one workflow run.
///
/// All mutation goes through action dispatch; the status mutex serializes
/// transitions, and the per-session dispatch lock serializes whole actions
/// so concurrent Pause/Stop resolve to some total order.
pub struct BotSession {
    pub id: BotId,
    pub run_id: WorkflowRunId,
    pub(crate) launch: LaunchSpec,
    pub(crate) oracle: Arc<dyn StepOracle>,
    pub(crate) browser_factory: Arc<dyn BrowserFactory>,
    pub(crate) manager: Arc<ActivityManager>,
    pub(crate) profile: BrowserProfile,
    status: Mutex<BotStatus>,
    pub(crate) worker: Mutex<Option<WorkerHandle>>,
    current_url: RwLock<String>,
    pub(crate) dispatch_lock: tokio::sync::Mutex<()>,
    created_at: DateTime<Utc>,
}

impl BotSession {
    pub fn new(
        run_id: WorkflowRunId,
        launch: LaunchSpec,
        oracle: Arc<dyn StepOracle>,
        browser_factory: Arc<dyn BrowserFactory>,
        sink: Arc<dyn ActivitySink>,
    ) -> Arc<Self> {
        let id = BotId::generate(&launch.platform, &run_id);
        let profile = BrowserProfile::for_user(&launch.user_id);
        let manager = Arc::new(ActivityManager::new(sink, Some(id.clone())));
        Arc::new(Self {
            id,
            run_id,
            launch,
            oracle,
            browser_factory,
            manager,
            profile,
            status: Mutex::new(BotStatus::Idle),
            worker: Mutex::new(None),
            current_url: RwLock::new(String::new()),
            dispatch_lock: tokio::sync::Mutex::new(()),
            created_at: Utc::now(),
        })
    }

    pub fn status(&self) -> BotStatus {
        *self.status.lock()
    }

    pub(crate) fn set_status(&self, status: BotStatus) {
        *self.status.lock() = status;
    }

    /// Compare-and-set under the status mutex. Returns whether the
    /// transition was applied. Control actions go through this so a worker
    /// that reached a terminal status first cannot be overridden by a
    /// command checked against the stale status.
    pub(crate) fn transition_if(&self, from: BotStatus, to: BotStatus) -> bool {
        let mut status = self.status.lock();
        if *status == from {
            *status = to;
            true
        } else {
            false
        }
    }

    pub fn current_url(&self) -> String {
        self.current_url.read().clone()
    }

    pub(crate) fn set_current_url(&self, url: String) {
        *self.current_url.write() = url;
    }

    /// Whether a worker task is currently alive.
    pub fn has_worker(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|handle| !handle.join.is_finished())
            .unwrap_or(false)
    }

    pub fn manager(&self) -> Arc<ActivityManager> {
        self.manager.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.status();
        SessionSnapshot {
            bot_id: self.id.clone(),
            workflow_run_id: self.run_id.clone(),
            status,
            is_running: status.is_active(),
            current_url: self.current_url(),
            has_worker: self.has_worker(),
            created_at: self.created_at,
        }
    }
}

/// Point-in-time view of one session, safe to hand to any caller.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub bot_id: BotId,
    pub workflow_run_id: WorkflowRunId,
    pub status: BotStatus,
    pub is_running: bool,
    pub current_url: String,
    pub has_worker: bool,
    pub created_at: DateTime<Utc>,
}
