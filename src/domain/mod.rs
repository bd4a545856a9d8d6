//! Domain variants for the classifier
//!
//! Each supported inquiry source differs in three ways: which field identifies
//! an item, how the prompts are worded, and how raw rows are preprocessed.
//! Those differences live in the closed `Domain` enum, chosen once from the
//! command line and passed down.

pub mod categories;
pub mod preprocess;
pub mod prompt;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClassifyError, Result};

pub use categories::{categories_json, load_categories, normalize_categories};
pub use prompt::{render_system_prompt, render_user_message};

/// One input row, batch item, or result record
pub type Record = Map<String, Value>;

/// Label fields every result record carries
pub const LABEL_FIELDS: [&str; 3] = ["level1", "level2", "level3"];

/// Field set on a result record when its request was abandoned
pub const ERROR_FIELD: &str = "error";

/// Supported inquiry domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Air tickets grouped into threads, identified by `thread_id`
    Air,
    /// Air call-center tickets with agent pre-labels
    Air2,
    /// Package-tour tickets with agent pre-labels
    Package,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Air, Domain::Air2, Domain::Package];

    /// Name used on the command line and in checkpoint keys
    pub fn name(&self) -> &'static str {
        match self {
            Domain::Air => "air",
            Domain::Air2 => "air2",
            Domain::Package => "package",
        }
    }

    /// Field that identifies an item in input and result records
    pub fn id_field(&self) -> &'static str {
        match self {
            Domain::Air => "thread_id",
            Domain::Air2 | Domain::Package => "ticket_id",
        }
    }

    /// Whether the user message carries agent pre-labels
    pub fn uses_pre_labels(&self) -> bool {
        !matches!(self, Domain::Air)
    }

    /// Identifier of the first item, used to label a batch in logs
    pub fn batch_label(&self, items: &[Record]) -> String {
        items
            .first()
            .and_then(|item| item.get(self.id_field()))
            .map(value_to_key)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Result record for an item whose request was abandoned
    pub fn fallback_record(&self, item: &Record, error: &str) -> Record {
        let mut record = Record::new();
        record.insert(
            self.id_field().to_string(),
            item.get(self.id_field()).cloned().unwrap_or(Value::Null),
        );
        for label in LABEL_FIELDS {
            record.insert(label.to_string(), Value::Null);
        }
        record.insert(ERROR_FIELD.to_string(), Value::String(error.to_string()));
        record
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Domain {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self> {
        Domain::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<&str> = Domain::ALL.iter().map(|d| d.name()).collect();
                ClassifyError::Config(format!("Unknown domain: {}. Available: {}", s, names.join(", ")))
            })
    }
}

/// Render a JSON value the way it is compared and displayed: strings as-is,
/// null as empty, everything else in its JSON form.
pub fn value_to_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// String view of a record field, empty when absent
pub fn field_str(record: &Record, key: &str) -> String {
    record.get(key).map(value_to_key).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_id_fields() {
        assert_eq!(Domain::Air.id_field(), "thread_id");
        assert_eq!(Domain::Air2.id_field(), "ticket_id");
        assert_eq!(Domain::Package.id_field(), "ticket_id");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("air".parse::<Domain>().unwrap(), Domain::Air);
        assert_eq!("AIR2".parse::<Domain>().unwrap(), Domain::Air2);
        assert_eq!(" package ".parse::<Domain>().unwrap(), Domain::Package);

        let err = "rail".parse::<Domain>().unwrap_err();
        assert!(err.to_string().contains("Unknown domain: rail"));
        assert!(err.to_string().contains("air2"));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Domain::Air2).unwrap(), "\"air2\"");
        let parsed: Domain = serde_json::from_str("\"package\"").unwrap();
        assert_eq!(parsed, Domain::Package);
    }

    #[test]
    fn test_batch_label() {
        let items = vec![record(json!({"ticket_id": 42, "content": "x"}))];
        assert_eq!(Domain::Package.batch_label(&items), "42");
        assert_eq!(Domain::Air.batch_label(&items), "unknown");
        assert_eq!(Domain::Air.batch_label(&[]), "unknown");
    }

    #[test]
    fn test_fallback_record() {
        let item = record(json!({"thread_id": "th-7", "content": "hello"}));
        let fallback = Domain::Air.fallback_record(&item, "boom");

        assert_eq!(fallback["thread_id"], json!("th-7"));
        assert_eq!(fallback["level1"], Value::Null);
        assert_eq!(fallback["level2"], Value::Null);
        assert_eq!(fallback["level3"], Value::Null);
        assert_eq!(fallback["error"], json!("boom"));
        assert!(!fallback.contains_key("content"));
    }

    #[test]
    fn test_value_to_key() {
        assert_eq!(value_to_key(&json!("abc")), "abc");
        assert_eq!(value_to_key(&json!(17)), "17");
        assert_eq!(value_to_key(&Value::Null), "");
        assert_eq!(value_to_key(&json!(true)), "true");
    }
}
