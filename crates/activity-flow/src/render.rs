//! Instruction template rendering.
//!
//! Templates use handlebars syntax (`{{variable}}`) expanded against the
//! workflow's input bindings. Rendering is best-effort: [`render`] reports
//! failures as a typed error, and [`render_or_original`] converts any
//! failure into the unrendered template text so a bad template can never
//! fail a workflow outward.

use handlebars::Handlebars;
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::RenderError;

/// Expand `template` against `inputs`. Strict mode: a missing variable is an
/// error, not an empty string.
pub fn render(template: &str, inputs: &Map<String, Value>) -> Result<String, RenderError> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    Ok(registry.render_template(template, &Value::Object(inputs.clone()))?)
}

/// Expand `template`, falling back to the original text when rendering
/// fails for any reason. Also covers plain non-template instructions.
pub fn render_or_original(template: &str, inputs: &Map<String, Value>) -> String {
    match render(template, inputs) {
        Ok(rendered) => rendered,
        Err(err) => {
            debug!("template left unrendered: {err}");
            template.to_string()
        }
    }
}
