// Workflow Templates - {{dot.path}} substitution in action config strings

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use ticketflow_shared::WorkflowContext;

use super::conditions::{lookup, value_to_string};

static TEMPLATE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("template pattern is valid"));

pub struct TemplateResolver;

impl TemplateResolver {
    /// Replaces every `{{path}}` token with the looked-up value's text.
    /// Missing and null values render as `<nil>`.
    pub fn resolve(template: &str, context: &WorkflowContext) -> String {
        TEMPLATE_VAR
            .replace_all(template, |caps: &Captures| value_to_string(&lookup(context, &caps[1])))
            .into_owned()
    }

    /// Resolves templates inside every string of a JSON value.
    pub fn resolve_value(value: &Value, context: &WorkflowContext) -> Value {
        match value {
            Value::String(s) => Value::String(Self::resolve(s, context)),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::resolve_value(v, context)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| Self::resolve_value(v, context)).collect()),
            _ => value.clone(),
        }
    }
}
