//! Workflow Activity Engine
//!
//! A workflow is a keyed graph of activities, each carrying an instruction
//! for an external decision oracle (an LLM-driven agent) and a condition for
//! moving on. Operation activities transition unconditionally; decision
//! activities let the oracle pick the next activity from a declared closed
//! set. The executor walks the graph one oracle turn at a time, enforcing
//! step budgets, retry bounds and the configured cycle policy.

pub mod definition;
pub mod errors;
pub mod executor;
pub mod model;
pub mod oracle;
pub mod render;

pub use definition::WorkflowDefinition;
pub use errors::{DefinitionError, ExecError, OracleError, RenderError};
pub use executor::{CyclePolicy, ExecutorConfig, RunOutcome, RunStatus, WorkflowExecutor};
pub use model::{Activity, ActivityDetail, DecisionResult, DEFAULT_MAX_STEPS, TERMINATE};
pub use oracle::{ScriptedOracle, ScriptedResponse, StepOracle, StepSignal};
