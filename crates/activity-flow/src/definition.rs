//! Workflow definition - inputs plus the keyed activity graph.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::errors::DefinitionError;
use crate::model::Activity;

/// Input key whose values are treated as filesystem paths and expanded at
/// load time.
const FILE_PATHS_INPUT: &str = "available_file_paths";

/// A loaded workflow: named input bindings and activities keyed by number.
///
/// Constructed once from a declarative JSON source; the activity graph is
/// immutable afterwards. Inputs may be adjusted up to the point a run
/// starts (the executor takes the definition by shared reference).
#[derive(Clone, Debug)]
pub struct WorkflowDefinition {
    inputs: Map<String, Value>,
    activities: BTreeMap<i64, Activity>,
}

impl WorkflowDefinition {
    /// Build a definition from the parsed document. Fails fast on the first
    /// invalid activity; nothing is partially constructed.
    pub fn from_value(data: &Value) -> Result<Self, DefinitionError> {
        let mut inputs = match data.get("inputs") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(DefinitionError::InvalidField {
                    number: None,
                    field: "inputs",
                    reason: "must be an object".into(),
                })
            }
        };
        expand_file_paths(&mut inputs);

        let records = match data.get("activities") {
            None | Some(Value::Null) => &[] as &[Value],
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => {
                return Err(DefinitionError::InvalidField {
                    number: None,
                    field: "activities",
                    reason: "must be an array".into(),
                })
            }
        };

        let mut activities = BTreeMap::new();
        for record in records {
            let activity = Activity::from_json(record)?;
            if activities.contains_key(&activity.number) {
                return Err(DefinitionError::DuplicateNumber(activity.number));
            }
            activities.insert(activity.number, activity);
        }

        Ok(Self { inputs, activities })
    }

    pub fn from_json_str(text: &str) -> Result<Self, DefinitionError> {
        let data: Value = serde_json::from_str(text)?;
        Self::from_value(&data)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn inputs(&self) -> &Map<String, Value> {
        &self.inputs
    }

    /// Adjust an input binding. Only valid before a run starts; the executor
    /// holds the definition immutably for the whole run.
    pub fn set_input(&mut self, name: impl Into<String>, value: Value) {
        self.inputs.insert(name.into(), value);
    }

    pub fn activity(&self, number: i64) -> Option<&Activity> {
        self.activities.get(&number)
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.values()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    /// Lowest activity number, the default starting point.
    pub fn first_activity_number(&self) -> Option<i64> {
        self.activities.keys().next().copied()
    }
}

/// Expand `~` prefixes in `available_file_paths` entries so agents receive
/// absolute paths.
fn expand_file_paths(inputs: &mut Map<String, Value>) {
    let Some(Value::Array(paths)) = inputs.get_mut(FILE_PATHS_INPUT) else {
        return;
    };
    for entry in paths.iter_mut() {
        if let Value::String(path) = entry {
            *path = expand_user(path).display().to_string();
        }
    }
}

fn expand_user(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
