//! Loading input records, merging results back, writing output
//!
//! Records are JSON objects read from a `.json` array or a `.jsonl` file.
//! After a run the classification results are left-joined onto the original
//! rows by the domain identifier, so every original row appears exactly once
//! in the output, with null labels when no result matched.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::Value;

use crate::domain::{ERROR_FIELD, Record, value_to_key};
use crate::error::{ClassifyError, Result};

/// Supported record file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// A single JSON array of objects
    Json,
    /// One JSON object per line
    JsonLines,
}

impl RecordFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("json") => Ok(RecordFormat::Json),
            Some("jsonl") | Some("ndjson") => Ok(RecordFormat::JsonLines),
            other => Err(ClassifyError::Input(format!(
                "Unsupported file format {:?} for {}. Please use .json or .jsonl",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }
}

/// Load records from a JSON or JSONL file
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    if !path.exists() {
        return Err(ClassifyError::Input(format!("Input file not found: {}", path.display())));
    }

    log::info!("Loading data from {}", path.display());
    let records = match RecordFormat::from_path(path)? {
        RecordFormat::Json => {
            let content = fs::read_to_string(path)?;
            let value: Value = serde_json::from_str(&content)?;
            match value {
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| into_record(item, i + 1, path))
                    .collect::<Result<Vec<_>>>()?,
                _ => {
                    return Err(ClassifyError::Input(format!(
                        "{} must contain a JSON array of objects",
                        path.display()
                    )));
                }
            }
        }
        RecordFormat::JsonLines => {
            let reader = BufReader::new(File::open(path)?);
            let mut records = Vec::new();
            for (i, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let value: Value = serde_json::from_str(&line)?;
                records.push(into_record(value, i + 1, path)?);
            }
            records
        }
    };

    log::info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Write records as a JSON array or JSON Lines, by extension
pub fn save_records(path: &Path, records: &[Record]) -> Result<()> {
    let format = RecordFormat::from_path(path)?;
    log::info!("Saving {} records to {}", records.len(), path.display());

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        RecordFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, records)?;
            writeln!(writer)?;
        }
        RecordFormat::JsonLines => {
            for record in records {
                writeln!(writer, "{}", serde_json::to_string(record)?)?;
            }
        }
    }
    writer.flush()?;

    log::info!("Save complete");
    Ok(())
}

/// Whether any result record carries the identifier field
pub fn has_identifier(results: &[Record], id_field: &str) -> bool {
    results.iter().any(|r| r.contains_key(id_field))
}

/// Left-join result records onto the original rows by identifier.
///
/// Identifiers are compared in their string form. When a resumed run produced
/// more than one result for an identifier, a successful one wins over an
/// error fallback, otherwise the first one is kept. Result fields that clash
/// with an original field are stored under `<field>_result`.
pub fn merge_results(original: &[Record], results: &[Record], id_field: &str) -> Vec<Record> {
    let mut by_id: HashMap<String, &Record> = HashMap::new();
    for result in results {
        let Some(id) = result.get(id_field) else {
            continue;
        };
        let key = value_to_key(id);
        let replace = match by_id.get(&key) {
            None => true,
            Some(existing) => existing.contains_key(ERROR_FIELD) && !result.contains_key(ERROR_FIELD),
        };
        if replace {
            by_id.insert(key, result);
        }
    }

    let original_columns: BTreeSet<&String> = original.iter().flat_map(|r| r.keys()).collect();

    // Result columns in first-seen order
    let mut seen = HashSet::new();
    let result_columns: Vec<&String> = results
        .iter()
        .flat_map(|r| r.keys())
        .filter(|k| k.as_str() != id_field && seen.insert(*k))
        .collect();

    let merged: Vec<Record> = original
        .iter()
        .map(|row| {
            let mut out = row.clone();
            let matched = row.get(id_field).and_then(|id| by_id.get(&value_to_key(id)));
            for column in &result_columns {
                let value = matched
                    .and_then(|r| r.get(column.as_str()))
                    .cloned()
                    .unwrap_or(Value::Null);
                let name = if original_columns.contains(column) {
                    format!("{}_result", column)
                } else {
                    column.to_string()
                };
                out.insert(name, value);
            }
            out
        })
        .collect();

    let matched = original
        .iter()
        .filter(|row| row.get(id_field).is_some_and(|id| by_id.contains_key(&value_to_key(id))))
        .count();
    log::info!(
        "Merged {} results onto {} rows ({} matched)",
        by_id.len(),
        original.len(),
        matched
    );

    merged
}

/// Default output path: `<input-stem>_result_<YYYYmmdd_HHMMSS>.jsonl`
pub fn default_output_path(input: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    PathBuf::from(format!("{}_result_{}.jsonl", stem, now.format("%Y%m%d_%H%M%S")))
}

/// The output path to write to, checked for a supported format.
///
/// Falls back to [`default_output_path`] when none was given.
pub fn resolve_output_path(output: Option<&Path>, input: &Path, now: DateTime<Local>) -> Result<PathBuf> {
    let path = match output {
        Some(path) => path.to_path_buf(),
        None => default_output_path(input, now),
    };
    RecordFormat::from_path(&path)?;
    Ok(path)
}

fn into_record(value: Value, position: usize, path: &Path) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ClassifyError::Input(format!(
            "{} item {} is not a JSON object: {}",
            path.display(),
            position,
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(RecordFormat::from_path(Path::new("a.json")).unwrap(), RecordFormat::Json);
        assert_eq!(RecordFormat::from_path(Path::new("a.JSONL")).unwrap(), RecordFormat::JsonLines);
        assert!(RecordFormat::from_path(Path::new("a.xlsx")).is_err());
        assert!(RecordFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_load_json_and_jsonl() {
        let temp = TempDir::new().unwrap();

        let json_path = temp.path().join("in.json");
        fs::write(&json_path, r#"[{"ticket_id": 1}, {"ticket_id": 2}]"#).unwrap();
        assert_eq!(load_records(&json_path).unwrap().len(), 2);

        let jsonl_path = temp.path().join("in.jsonl");
        fs::write(&jsonl_path, "{\"ticket_id\": 1}\n\n{\"ticket_id\": 2}\n{\"ticket_id\": 3}\n").unwrap();
        assert_eq!(load_records(&jsonl_path).unwrap().len(), 3);
    }

    #[test]
    fn test_load_rejects_non_objects() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("in.json");
        fs::write(&path, r#"[{"ticket_id": 1}, 5]"#).unwrap();
        let err = load_records(&path).unwrap_err();
        assert!(err.to_string().contains("item 2"));

        fs::write(&path, r#"{"ticket_id": 1}"#).unwrap();
        assert!(matches!(load_records(&path), Err(ClassifyError::Input(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            load_records(&temp.path().join("none.json")),
            Err(ClassifyError::Input(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let records = vec![record(json!({"ticket_id": "a", "level1": "x"}))];

        for name in ["out/out.json", "out/out.jsonl"] {
            let path = temp.path().join(name);
            save_records(&path, &records).unwrap();
            let loaded = load_records(&path).unwrap();
            assert_eq!(loaded, records);
        }
    }

    #[test]
    fn test_save_unsupported_format_leaves_no_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out").join("out.csv");
        let records = vec![record(json!({"ticket_id": "T1"}))];

        assert!(matches!(save_records(&path, &records), Err(ClassifyError::Input(_))));
        assert!(!path.exists());
        assert!(!temp.path().join("out").exists());
    }

    #[test]
    fn test_merge_keeps_original_column_order() {
        let original = vec![record(json!({"ticket_id": "x", "channel": "tel", "content": "a", "agent_name": "kim"}))];
        let results = vec![record(json!({"ticket_id": "x", "level1": "L1", "level2": "L2", "level3": "L3"}))];

        let merged = merge_results(&original, &results, "ticket_id");
        let columns: Vec<&str> = merged[0].keys().map(String::as_str).collect();
        assert_eq!(
            columns,
            ["ticket_id", "channel", "content", "agent_name", "level1", "level2", "level3"]
        );
    }

    #[test]
    fn test_merge_left_join() {
        let original = vec![
            record(json!({"ticket_id": 1, "content": "a"})),
            record(json!({"ticket_id": 2, "content": "b"})),
            record(json!({"ticket_id": 3, "content": "c"})),
        ];
        let results = vec![
            record(json!({"ticket_id": "1", "level1": "L1", "level2": "L2", "level3": "L3"})),
            record(json!({"ticket_id": "3", "level1": null, "level2": null, "level3": null, "error": "gave up"})),
        ];

        let merged = merge_results(&original, &results, "ticket_id");
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0]["level1"], json!("L1"));
        assert_eq!(merged[0]["error"], Value::Null);
        assert_eq!(merged[1]["level1"], Value::Null);
        assert_eq!(merged[1]["content"], json!("b"));
        assert_eq!(merged[2]["error"], json!("gave up"));
    }

    #[test]
    fn test_merge_prefers_success_over_fallback() {
        let original = vec![record(json!({"ticket_id": "x"}))];
        let results = vec![
            record(json!({"ticket_id": "x", "level1": null, "error": "timeout"})),
            record(json!({"ticket_id": "x", "level1": "ok"})),
            record(json!({"ticket_id": "x", "level1": "later"})),
        ];

        let merged = merge_results(&original, &results, "ticket_id");
        assert_eq!(merged[0]["level1"], json!("ok"));
        assert_eq!(merged[0]["error"], Value::Null);
    }

    #[test]
    fn test_merge_renames_clashing_columns() {
        let original = vec![record(json!({"ticket_id": "x", "level1": "agent label"}))];
        let results = vec![record(json!({"ticket_id": "x", "level1": "model label"}))];

        let merged = merge_results(&original, &results, "ticket_id");
        assert_eq!(merged[0]["level1"], json!("agent label"));
        assert_eq!(merged[0]["level1_result"], json!("model label"));
    }

    #[test]
    fn test_has_identifier() {
        let results = vec![record(json!({"level1": "a"}))];
        assert!(!has_identifier(&results, "ticket_id"));
        assert!(has_identifier(&[record(json!({"ticket_id": 1}))], "ticket_id"));
    }

    #[test]
    fn test_default_output_path() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = default_output_path(Path::new("/data/inquiries.json"), now);
        assert_eq!(path, PathBuf::from("inquiries_result_20240309_140507.jsonl"));
    }

    #[test]
    fn test_resolve_output_path() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let input = Path::new("inquiries.json");

        assert_eq!(
            resolve_output_path(None, input, now).unwrap(),
            PathBuf::from("inquiries_result_20240309_140507.jsonl")
        );
        assert_eq!(
            resolve_output_path(Some(Path::new("out/labels.json")), input, now).unwrap(),
            PathBuf::from("out/labels.json")
        );
        assert!(matches!(
            resolve_output_path(Some(Path::new("labels.csv")), input, now),
            Err(ClassifyError::Input(_))
        ));
    }
}
