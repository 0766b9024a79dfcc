//! Decision oracle abstraction.
//!
//! The oracle is the external collaborator (typically an LLM-driven browser
//! agent) that actually carries out an activity's instruction. The executor
//! only needs two capabilities: one working turn against an instruction, and
//! a structured answer to a decision prompt.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::OracleError;
use crate::model::DecisionResult;

/// Outcome of one oracle turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepSignal {
    /// The oracle is still working towards the finish condition.
    Working,
    /// The activity's finish condition is met.
    FinishConditionMet,
}

#[async_trait]
pub trait StepOracle: Send + Sync {
    /// Consume one oracle turn for the rendered instruction.
    async fn step(&self, activity_number: i64, prompt: &str) -> Result<StepSignal, OracleError>;

    /// Answer a decision prompt. The legal answers are handed over verbatim;
    /// the executor, not the oracle, enforces membership.
    async fn decide(
        &self,
        activity_number: i64,
        prompt: &str,
        options: &[i64],
    ) -> Result<DecisionResult, OracleError>;
}

/// Pre-recorded oracle response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedResponse {
    /// One turn that does not yet meet the finish condition.
    Working,
    /// The finish condition is met.
    Finished,
    /// Answer to a decision prompt.
    Decision {
        next_activity_number: i64,
        reason: String,
    },
}

/// Deterministic oracle driven by a pre-recorded response list. Used by the
/// CLI for offline runs and by tests; the workflow path it produces is a
/// pure function of the script.
pub struct ScriptedOracle {
    responses: Mutex<VecDeque<ScriptedResponse>>,
}

impl ScriptedOracle {
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let responses: Vec<ScriptedResponse> = serde_json::from_str(text)?;
        Ok(Self::new(responses))
    }

    /// Responses not yet consumed.
    pub async fn remaining(&self) -> usize {
        self.responses.lock().await.len()
    }

    async fn pop(&self) -> Result<ScriptedResponse, OracleError> {
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or(OracleError::ScriptExhausted)
    }
}

#[async_trait]
impl StepOracle for ScriptedOracle {
    async fn step(&self, activity_number: i64, _prompt: &str) -> Result<StepSignal, OracleError> {
        match self.pop().await? {
            ScriptedResponse::Working => Ok(StepSignal::Working),
            ScriptedResponse::Finished => Ok(StepSignal::FinishConditionMet),
            ScriptedResponse::Decision { .. } => Err(OracleError::ScriptMismatch(format!(
                "activity {activity_number}: expected a step response, script holds a decision"
            ))),
        }
    }

    async fn decide(
        &self,
        activity_number: i64,
        _prompt: &str,
        _options: &[i64],
    ) -> Result<DecisionResult, OracleError> {
        match self.pop().await? {
            ScriptedResponse::Decision {
                next_activity_number,
                reason,
            } => Ok(DecisionResult {
                next_activity_number,
                reason,
            }),
            other => Err(OracleError::ScriptMismatch(format!(
                "activity {activity_number}: expected a decision response, script holds {other:?}"
            ))),
        }
    }
}
