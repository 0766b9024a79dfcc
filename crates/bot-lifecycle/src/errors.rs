//! Lifecycle error types.

use thiserror::Error;

use crate::browser::BrowserError;

/// Internal lifecycle faults. These never cross the action dispatch
/// boundary; dispatch converts them into a failed [`crate::ActionResult`].
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("{0}")]
    Internal(String),
}
