//! Workflow error types.

use thiserror::Error;

/// Errors raised while constructing a workflow definition. The definition is
/// never partially built: the first error aborts loading.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// A required field is absent from an activity record.
    #[error("activity {}: missing required field `{field}`", display_number(.number))]
    MissingField {
        number: Option<i64>,
        field: &'static str,
    },

    /// The `activity_type` discriminator is not a known kind.
    #[error(
        "activity {}: unsupported activity_type `{kind}`. Supported types: [\"operation\", \"decision\"]",
        display_number(.number)
    )]
    UnsupportedKind { number: Option<i64>, kind: String },

    /// A field is present but malformed.
    #[error("activity {}: invalid field `{field}`: {reason}", display_number(.number))]
    InvalidField {
        number: Option<i64>,
        field: &'static str,
        reason: String,
    },

    /// Two activities share one number.
    #[error("duplicate activity number {0}")]
    DuplicateNumber(i64),

    /// A decision activity declared no next-step options.
    #[error("activity {number}: next_activity_number_options must not be empty")]
    EmptyOptions { number: i64 },

    #[error("failed to read workflow file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("workflow document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

fn display_number(number: &Option<i64>) -> String {
    match number {
        Some(n) => n.to_string(),
        None => "unknown".to_string(),
    }
}

/// Contract violations that terminate a workflow run.
#[derive(Debug, Error)]
pub enum ExecError {
    /// A transition targeted an activity number that does not exist.
    #[error("dangling transition to activity {to}{}", from_suffix(.from))]
    DanglingTransition { from: Option<i64>, to: i64 },

    /// An activity consumed its oracle-turn budget without meeting its
    /// finish condition.
    #[error("activity {activity}: step budget exceeded ({max_steps} oracle turns)")]
    StepBudgetExceeded { activity: i64, max_steps: u32 },

    /// The oracle kept answering a decision with a number outside the
    /// declared option set.
    #[error("activity {activity}: decision answer {chosen} is not in the declared options {options:?}")]
    DecisionRejected {
        activity: i64,
        chosen: i64,
        options: Vec<i64>,
    },

    /// The run exceeded the global transition cap of the cycle policy.
    #[error("workflow exceeded the transition cap of {cap}")]
    TransitionCapExceeded { cap: u32 },

    /// The cycle policy forbids revisits and an activity came up twice.
    #[error("activity {activity} revisited but the cycle policy forbids cycles")]
    CycleDetected { activity: i64 },

    /// The oracle collaborator failed outside a covered retry.
    #[error("activity {activity}: oracle fault")]
    OracleFault {
        activity: i64,
        #[source]
        source: OracleError,
    },
}

/// Faults from the external decision oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle fault: {0}")]
    Fault(String),

    /// A scripted oracle ran out of pre-recorded responses.
    #[error("oracle script exhausted")]
    ScriptExhausted,

    /// A scripted oracle was asked something its next response cannot answer.
    #[error("oracle script mismatch: {0}")]
    ScriptMismatch(String),
}

/// Template rendering failure. Callers substitute the original template text
/// instead of propagating this; see [`crate::render`].
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template rendering failed: {0}")]
    Template(#[from] handlebars::RenderError),
}

fn from_suffix(from: &Option<i64>) -> String {
    match from {
        Some(n) => format!(" (from activity {n})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_kind_names_offender_and_supported_set() {
        let err = DefinitionError::UnsupportedKind {
            number: None,
            kind: "survey".into(),
        };
        let text = err.to_string();
        assert!(text.contains("unknown"));
        assert!(text.contains("survey"));
        assert!(text.contains("\"operation\""));
        assert!(text.contains("\"decision\""));
    }

    #[test]
    fn dangling_transition_names_both_ends() {
        let err = ExecError::DanglingTransition {
            from: Some(3),
            to: 9,
        };
        let text = err.to_string();
        assert!(text.contains("activity 9"));
        assert!(text.contains("from activity 3"));
    }
}
