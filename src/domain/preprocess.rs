//! Input preprocessing: PII masking and thread aggregation
//!
//! Air rows are filtered to customer messages, masked (per-row sensitive
//! values, passport numbers, phone numbers) and then folded into one item per
//! thread. Air2 and package rows only get their phone numbers masked.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{Domain, Record, field_str, value_to_key};
use crate::error::{ClassifyError, Result};

static PASSPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bM[A-Za-z0-9]{8}\b").expect("passport pattern is valid"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b010-?\d{4}-?\d{4}\b").expect("phone pattern is valid"));

static PHONE_WIDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+82[-\s\.]?)?0?1[0-9][-\s\.]?\d{3,4}[-\s\.]?\d{4}").expect("wide phone pattern is valid")
});

static WHITESPACE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n\t]+").expect("whitespace pattern is valid"));

/// Fields whose per-row values are masked out of air titles and contents
const AIR_SENSITIVE_FIELDS: [&str; 5] = [
    "inquirer_id",
    "inquirer_name",
    "inquiry_status",
    "reservation_number",
    "destination",
];

const MASKED_PHONE: &str = "<MASKED_PHONE>";
const MASKED_PASSPORT: &str = "<MASKED_PASSPORT>";
const MASKED_VALUE: &str = "<MASKED_VALUE>";

/// Run the domain's preprocessing over raw input rows
pub fn preprocess(domain: Domain, records: Vec<Record>) -> Result<Vec<Record>> {
    match domain {
        Domain::Air => aggregate_by_thread(mask_air(records)),
        Domain::Air2 | Domain::Package => Ok(preprocess_simple(records)),
    }
}

/// Collapse control whitespace and mask phone numbers (air2/package style)
pub fn mask_text_simple(text: &str) -> String {
    let text = WHITESPACE_RUN_RE.replace_all(text, " ");
    PHONE_WIDE_RE.replace_all(&text, MASKED_PHONE).into_owned()
}

/// Mask literal sensitive values, passport numbers and phone numbers (air style)
pub fn mask_text_advanced(text: &str, sensitive: &[String]) -> String {
    let mut masked = text.to_string();
    for value in sensitive {
        let value = value.trim();
        if !value.is_empty() {
            masked = masked.replace(value, MASKED_VALUE);
        }
    }
    let masked = PASSPORT_RE.replace_all(&masked, MASKED_PASSPORT);
    PHONE_RE.replace_all(&masked, MASKED_PHONE).into_owned()
}

/// Keep customer-sent air rows and add masked `title_anon` / `content_anon`
/// fields. Row count is otherwise preserved.
pub fn mask_air(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .filter(|r| match r.get("response_type") {
            Some(v) => value_to_key(v) == "RECEIVE",
            None => true,
        })
        .map(|mut r| {
            let sensitive: Vec<String> = AIR_SENSITIVE_FIELDS
                .iter()
                .filter_map(|f| r.get(*f))
                .map(value_to_key)
                .collect();
            let title = mask_text_advanced(&field_str(&r, "inquiry_title"), &sensitive);
            let content = mask_text_advanced(&field_str(&r, "inquiry_content"), &sensitive);
            r.insert("title_anon".to_string(), Value::String(title));
            r.insert("content_anon".to_string(), Value::String(content));
            r
        })
        .collect()
}

/// Fold masked air rows into one item per thread, texts joined in
/// `inquiry_created_at` order. Output is ordered by thread id.
pub fn aggregate_by_thread(mut records: Vec<Record>) -> Result<Vec<Record>> {
    if records.iter().any(|r| !r.contains_key("thread_id")) {
        return Err(ClassifyError::Input(
            "air domain requires a 'thread_id' field on every row".to_string(),
        ));
    }

    records.sort_by_key(|r| field_str(r, "inquiry_created_at"));

    let mut threads: BTreeMap<String, (Value, Vec<String>, Vec<String>)> = BTreeMap::new();
    for record in &records {
        let id = record.get("thread_id").cloned().unwrap_or(Value::Null);
        let entry = threads
            .entry(value_to_key(&id))
            .or_insert_with(|| (id, Vec::new(), Vec::new()));
        push_non_empty(&mut entry.1, field_str(record, "title_anon"));
        push_non_empty(&mut entry.2, field_str(record, "content_anon"));
    }

    Ok(threads
        .into_values()
        .map(|(id, titles, contents)| {
            let mut item = Record::new();
            item.insert("thread_id".to_string(), id);
            item.insert("title_anon".to_string(), Value::String(titles.join(" ")));
            item.insert("content".to_string(), Value::String(contents.join(" ")));
            item
        })
        .collect())
}

/// Mask the `content` field of air2/package rows in place
pub fn preprocess_simple(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .map(|mut r| {
            if let Some(content) = r.get("content") {
                let masked = mask_text_simple(&value_to_key(content));
                r.insert("content".to_string(), Value::String(masked));
            }
            r
        })
        .collect()
}

fn push_non_empty(parts: &mut Vec<String>, text: String) {
    if !text.is_empty() {
        parts.push(text);
    }
}
