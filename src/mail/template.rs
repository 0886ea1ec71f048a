//! `{{var}}` placeholder rendering and template conditions.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\s*\}\}").expect("placeholder pattern")
});

/// Replaces `{{name}}` (or dotted `{{event.name}}`) with values from
/// `variables`. Missing or null values render as an empty string.
pub fn render(template: &str, variables: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            lookup(variables, &caps[1]).map(display).unwrap_or_default()
        })
        .into_owned()
}

/// Resolves a dotted path inside a JSON object.
pub fn lookup<'a>(variables: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(variables, |current, segment| current.get(segment))
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Optional gate on whether a template fires for a given variable bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TemplateConditions {
    /// Fire only when `variables.status` is one of these values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_filter: Vec<String>,
    /// Fire only when every key equals the given value in the variables
    #[serde(default, rename = "match", skip_serializing_if = "Map::is_empty")]
    #[schema(value_type = Object)]
    pub match_fields: Map<String, Value>,
}

impl TemplateConditions {
    /// Parses stored conditions; `None` or `null` means unconditional.
    pub fn from_stored(stored: Option<&Value>) -> Result<Self, serde_json::Error> {
        match stored {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => serde_json::from_value(value.clone()),
        }
    }

    /// True when the template fires unconditionally.
    pub fn is_empty(&self) -> bool {
        self.status_filter.is_empty() && self.match_fields.is_empty()
    }

    pub fn matches(&self, variables: &Value) -> bool {
        if !self.status_filter.is_empty() {
            let status = variables.get("status").and_then(Value::as_str);
            if !status.is_some_and(|status| self.status_filter.iter().any(|s| s == status)) {
                return false;
            }
        }

        self.match_fields
            .iter()
            .all(|(key, expected)| lookup(variables, key) == Some(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_flat_and_nested_placeholders() {
        let vars = json!({
            "first_name": "Ana",
            "event": { "name": "RustConf" },
            "seats": 2,
        });

        assert_eq!(
            render("Hi {{first_name}}, see you at {{ event.name }} ({{seats}})", &vars),
            "Hi Ana, see you at RustConf (2)"
        );
    }

    #[test]
    fn missing_values_render_empty() {
        assert_eq!(render("Hello {{nobody}}!", &json!({})), "Hello !");
        assert_eq!(render("{{a}}", &json!({ "a": null })), "");
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        assert_eq!(render("{ not a var }", &json!({})), "{ not a var }");
    }

    #[test]
    fn status_filter_requires_listed_status() {
        let conditions = TemplateConditions {
            status_filter: vec!["approved".to_string()],
            ..Default::default()
        };

        assert!(conditions.matches(&json!({ "status": "approved" })));
        assert!(!conditions.matches(&json!({ "status": "not-approved" })));
        assert!(!conditions.matches(&json!({})));
    }

    #[test]
    fn match_requires_every_pair() {
        let conditions: TemplateConditions = serde_json::from_value(json!({
            "match": { "participant_type": "speaker", "event.slug": "rustconf" }
        }))
        .unwrap();

        assert!(conditions.matches(&json!({
            "participant_type": "speaker",
            "event": { "slug": "rustconf" }
        })));
        assert!(!conditions.matches(&json!({ "participant_type": "speaker" })));
    }

    #[test]
    fn stored_null_is_unconditional() {
        let conditions = TemplateConditions::from_stored(Some(&Value::Null)).unwrap();
        assert!(conditions.matches(&json!({ "anything": true })));
    }
}
