//! Browser collaborator contract.
//!
//! The runtime never drives a browser itself; it owns a boxed session
//! behind this trait, created per bot by a factory. The worker task is the
//! sole holder of the live session, and `stop` is only ever called from it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser fault: {0}")]
    Fault(String),

    #[error("browser session not started")]
    NotStarted,
}

/// Browser profile identity, resolved once at session creation from the
/// owning user. Never recomputed mid-run.
#[derive(Clone, Debug)]
pub struct BrowserProfile {
    pub user_id: String,
    pub profile_key: String,
}

impl BrowserProfile {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let profile_key = format!("huntr-profile-{user_id}");
        Self {
            user_id,
            profile_key,
        }
    }
}

/// A live browser session. Exclusively owned by one worker task.
#[async_trait]
pub trait BrowserSession: Send {
    async fn start(&mut self) -> Result<(), BrowserError>;
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;
    async fn current_url(&self) -> Result<String, BrowserError>;
    async fn page_title(&self) -> Result<String, BrowserError>;
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;
    async fn stop(&mut self) -> Result<(), BrowserError>;
}

/// Allocates a browser session for a profile.
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn open(&self, profile: &BrowserProfile) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// Observable state of a [`NullBrowser`], shared with the factory so tests
/// can assert on session teardown.
#[derive(Debug, Default)]
pub struct NullBrowserState {
    pub started: bool,
    pub stopped: bool,
    pub url: String,
    pub visited: Vec<String>,
}

/// In-memory browser double for tests and offline runs.
pub struct NullBrowser {
    state: Arc<Mutex<NullBrowserState>>,
}

impl NullBrowser {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(NullBrowserState::default())),
        }
    }

    fn with_state(state: Arc<Mutex<NullBrowserState>>) -> Self {
        Self { state }
    }
}

impl Default for NullBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserSession for NullBrowser {
    async fn start(&mut self) -> Result<(), BrowserError> {
        self.state.lock().started = true;
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.state.lock();
        if !state.started {
            return Err(BrowserError::NotStarted);
        }
        state.url = url.to_string();
        state.visited.push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.state.lock().url.clone())
    }

    async fn page_title(&self) -> Result<String, BrowserError> {
        Ok(String::new())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        Ok(Vec::new())
    }

    async fn stop(&mut self) -> Result<(), BrowserError> {
        let mut state = self.state.lock();
        state.started = false;
        state.stopped = true;
        Ok(())
    }
}

/// Factory handing out [`NullBrowser`] sessions while keeping a handle on
/// each session's state.
#[derive(Default)]
pub struct NullBrowserFactory {
    states: Mutex<Vec<Arc<Mutex<NullBrowserState>>>>,
}

impl NullBrowserFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// State handles for every session opened so far, in open order.
    pub fn sessions(&self) -> Vec<Arc<Mutex<NullBrowserState>>> {
        self.states.lock().clone()
    }
}

#[async_trait]
impl BrowserFactory for NullBrowserFactory {
    async fn open(
        &self,
        _profile: &BrowserProfile,
    ) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let state = Arc::new(Mutex::new(NullBrowserState::default()));
        self.states.lock().push(state.clone());
        Ok(Box::new(NullBrowser::with_state(state)))
    }
}
