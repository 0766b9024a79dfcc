//! Activity model - one node of a workflow graph.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DefinitionError;
use crate::render::render_or_original;

/// Sentinel `next_activity_number` meaning "the workflow terminates here".
pub const TERMINATE: i64 = -1;

/// Default upper bound on oracle turns consumed by one activity.
pub const DEFAULT_MAX_STEPS: u32 = 100;

/// One workflow step. The variant payload is a closed set: anything other
/// than an operation or a decision is rejected at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Activity {
    /// Unique key within the workflow, >= 0.
    pub number: i64,
    /// Instruction template handed to the oracle.
    pub instruction: String,
    /// Template describing when this step counts as done.
    pub finish_condition: String,
    /// Upper bound on oracle turns for this step.
    pub max_steps: u32,
    pub detail: ActivityDetail,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ActivityDetail {
    Operation {
        /// Next activity key; [`TERMINATE`] ends the workflow.
        next_activity_number: i64,
    },
    Decision {
        /// Closed set of legal next activity keys, in declaration order.
        next_activity_number_options: Vec<i64>,
        /// Template guiding which option to pick.
        decision_instruction: String,
    },
}

/// The oracle's structured answer to a decision activity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub next_activity_number: i64,
    pub reason: String,
}

impl Activity {
    /// Build an activity from one record of the declarative source,
    /// validating required fields per variant.
    pub fn from_json(record: &Value) -> Result<Self, DefinitionError> {
        let number = record
            .get("activity_number")
            .and_then(Value::as_i64);

        let kind = require_str(record, "activity_type", number)?;
        if kind != "operation" && kind != "decision" {
            return Err(DefinitionError::UnsupportedKind {
                number,
                kind: kind.to_string(),
            });
        }

        let number = number.ok_or(DefinitionError::MissingField {
            number: None,
            field: "activity_number",
        })?;
        if number < 0 {
            return Err(DefinitionError::InvalidField {
                number: Some(number),
                field: "activity_number",
                reason: "must be >= 0".into(),
            });
        }

        let instruction = require_str(record, "instruction", Some(number))?.to_string();
        let finish_condition = require_str(record, "finish_condition", Some(number))?.to_string();
        let max_steps = match record.get("max_steps") {
            None | Some(Value::Null) => DEFAULT_MAX_STEPS,
            Some(value) => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| DefinitionError::InvalidField {
                    number: Some(number),
                    field: "max_steps",
                    reason: "must be a non-negative integer".into(),
                })?,
        };

        let detail = match kind {
            "operation" => ActivityDetail::Operation {
                next_activity_number: record
                    .get("next_activity_number")
                    .and_then(Value::as_i64)
                    .unwrap_or(TERMINATE),
            },
            "decision" => {
                let options = record
                    .get("next_activity_number_options")
                    .ok_or(DefinitionError::MissingField {
                        number: Some(number),
                        field: "next_activity_number_options",
                    })?
                    .as_array()
                    .ok_or_else(|| DefinitionError::InvalidField {
                        number: Some(number),
                        field: "next_activity_number_options",
                        reason: "must be an array of integers".into(),
                    })?
                    .iter()
                    .map(|v| {
                        v.as_i64().ok_or_else(|| DefinitionError::InvalidField {
                            number: Some(number),
                            field: "next_activity_number_options",
                            reason: "must be an array of integers".into(),
                        })
                    })
                    .collect::<Result<Vec<i64>, _>>()?;
                if options.is_empty() {
                    return Err(DefinitionError::EmptyOptions { number });
                }
                ActivityDetail::Decision {
                    next_activity_number_options: options,
                    decision_instruction: require_str(record, "decision_instruction", Some(number))?
                        .to_string(),
                }
            }
            _ => unreachable!("kind validated above"),
        };

        Ok(Self {
            number,
            instruction,
            finish_condition,
            max_steps,
            detail,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self.detail {
            ActivityDetail::Operation { .. } => "operation",
            ActivityDetail::Decision { .. } => "decision",
        }
    }

    /// Render the full oracle instruction for this activity. Rendering is
    /// best-effort: a template that fails to expand is passed through
    /// verbatim.
    pub fn to_oracle_prompt(&self, inputs: &Map<String, Value>) -> String {
        let instruction = render_or_original(&self.instruction, inputs);
        let finish_condition = render_or_original(&self.finish_condition, inputs);
        let mut prompt = format!(
            "Please do the following: {instruction}\nThe finish condition is: {finish_condition}"
        );
        if let ActivityDetail::Decision {
            next_activity_number_options,
            decision_instruction,
        } = &self.detail
        {
            // The closed set of legal answers is given to the oracle verbatim.
            let guidance = render_or_original(decision_instruction, inputs);
            prompt.push_str(&format!(
                "\nLastly, you need to pick one of the following activity numbers: {next_activity_number_options:?}\nbased on this instruction: {guidance}"
            ));
        }
        prompt
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let preview: String = self.instruction.chars().take(50).collect();
        let ellipsis = if self.instruction.chars().count() > 50 {
            "..."
        } else {
            ""
        };
        write!(f, "Activity {}: {preview}{ellipsis}", self.number)
    }
}

fn require_str<'a>(
    record: &'a Value,
    field: &'static str,
    number: Option<i64>,
) -> Result<&'a str, DefinitionError> {
    record
        .get(field)
        .and_then(Value::as_str)
        .ok_or(DefinitionError::MissingField { number, field })
}
