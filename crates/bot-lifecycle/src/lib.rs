//! Bot Lifecycle Controller
//!
//! One bot session per workflow run: a worker task owns the live browser
//! session and runs the workflow executor; a separate control context issues
//! Start/Pause/Resume/Stop. Every lifecycle operation is a command with a
//! precondition, a side effect and a status broadcast, and returns a uniform
//! result - callers never see a raw fault.

pub mod actions;
pub mod browser;
pub mod controller;
pub mod errors;
pub mod session;

pub use actions::{
    dispatch, ActionResult, LifecycleAction, PauseAction, ResumeAction, StartAction, StopAction,
};
pub use browser::{
    BrowserError, BrowserFactory, BrowserProfile, BrowserSession, NullBrowser, NullBrowserFactory,
};
pub use controller::{BotController, StartRequest};
pub use errors::LifecycleError;
pub use session::{BotSession, LaunchSpec, SessionSnapshot};
