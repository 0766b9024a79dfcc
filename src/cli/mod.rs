pub mod run;
pub mod validate;

pub use run::{cmd_run, RunArgs};
pub use validate::{cmd_validate, ValidateArgs};

use anyhow::{bail, Result};
use serde_json::Value;

/// Parse a `key=value` input override. Values that parse as JSON are taken
/// as JSON; everything else is a plain string.
pub(crate) fn parse_input_override(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("invalid input override `{raw}`, expected key=value");
    };
    if key.is_empty() {
        bail!("invalid input override `{raw}`, empty key");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_values_parse_as_json_when_possible() {
        let (key, value) = parse_input_override("retries=3").unwrap();
        assert_eq!(key, "retries");
        assert_eq!(value, serde_json::json!(3));

        let (_, value) = parse_input_override("company=Acme Corp").unwrap();
        assert_eq!(value, Value::String("Acme Corp".into()));

        let (_, value) = parse_input_override("paths=[\"~/cv.pdf\"]").unwrap();
        assert!(value.is_array());
    }

    #[test]
    fn override_without_equals_is_rejected() {
        assert!(parse_input_override("company").is_err());
        assert!(parse_input_override("=value").is_err());
    }
}
