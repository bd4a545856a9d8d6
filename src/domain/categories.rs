//! Category definition table
//!
//! The table lists every allowed level1/level2/level3 combination with a
//! description and a note. Spreadsheet exports use a mix of Korean and
//! English headers, so header names are normalized before validation.

use std::path::Path;

use serde_json::Value;

use super::Record;
use crate::dataset::load_records;
use crate::error::{ClassifyError, Result};

/// Header aliases mapped to canonical field names
const HEADER_ALIASES: [(&str, &str); 8] = [
    ("유형_1", "level1"),
    ("유형_2", "level2"),
    ("유형_3", "level3"),
    ("설명", "description"),
    ("비고", "note"),
    ("Level1", "level1"),
    ("Level2", "level2"),
    ("Level3", "level3"),
];

const REQUIRED_FIELDS: [&str; 3] = ["level1", "level2", "level3"];
const TEXT_FIELDS: [&str; 2] = ["description", "note"];

/// Load and normalize the category table from a JSON / JSONL file
pub fn load_categories(path: &Path) -> Result<Vec<Record>> {
    if !path.exists() {
        return Err(ClassifyError::Categories(format!(
            "Category file not found: {}",
            path.display()
        )));
    }

    log::info!("Loading categories from {}", path.display());
    let rows = load_records(path)?;
    let categories = normalize_categories(rows)?;
    log::info!("Loaded {} category rules", categories.len());
    Ok(categories)
}

/// Rename header aliases, check required columns, and blank out nulls
pub fn normalize_categories(rows: Vec<Record>) -> Result<Vec<Record>> {
    if rows.is_empty() {
        return Err(ClassifyError::Categories("Category table has no rows".to_string()));
    }

    let mut rows: Vec<Record> = rows.into_iter().map(rename_headers).collect();

    for field in REQUIRED_FIELDS {
        if !rows.iter().any(|r| r.contains_key(field)) {
            return Err(ClassifyError::Categories(format!(
                "Category file missing required column: {}",
                field
            )));
        }
    }

    for row in &mut rows {
        for field in REQUIRED_FIELDS.iter().chain(TEXT_FIELDS.iter()) {
            let entry = row.entry(field.to_string()).or_insert(Value::Null);
            if entry.is_null() {
                *entry = Value::String(String::new());
            }
        }
    }

    Ok(rows)
}

/// Serialize categories for embedding in the system prompt
pub fn categories_json(categories: &[Record]) -> Result<String> {
    Ok(serde_json::to_string(categories)?)
}

fn rename_headers(row: Record) -> Record {
    row.into_iter()
        .map(|(key, value)| {
            let canonical = HEADER_ALIASES
                .iter()
                .find(|(alias, _)| *alias == key)
                .map(|(_, name)| name.to_string())
                .unwrap_or(key);
            (canonical, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_korean_headers() {
        let rows = vec![record(json!({
            "유형_1": "예약",
            "유형_2": "변경",
            "유형_3": "날짜변경",
            "설명": "date change",
        }))];

        let categories = normalize_categories(rows).unwrap();
        assert_eq!(categories[0]["level1"], json!("예약"));
        assert_eq!(categories[0]["level3"], json!("날짜변경"));
        assert_eq!(categories[0]["description"], json!("date change"));
        assert_eq!(categories[0]["note"], json!(""));
    }

    #[test]
    fn test_null_values_become_empty() {
        let rows = vec![
            record(json!({"Level1": "A", "Level2": "B", "Level3": null, "note": null})),
            record(json!({"level1": "C", "level2": "D", "level3": "E"})),
        ];

        let categories = normalize_categories(rows).unwrap();
        assert_eq!(categories[0]["level3"], json!(""));
        assert_eq!(categories[0]["note"], json!(""));
        assert_eq!(categories[1]["description"], json!(""));
    }

    #[test]
    fn test_missing_required_column() {
        let rows = vec![record(json!({"level1": "A", "level2": "B"}))];
        let err = normalize_categories(rows).unwrap_err();
        assert!(err.to_string().contains("level3"));
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(matches!(normalize_categories(vec![]), Err(ClassifyError::Categories(_))));
    }

    #[test]
    fn test_categories_json_keeps_hangul() {
        let rows = normalize_categories(vec![record(json!({"level1": "환불", "level2": "x", "level3": "y"}))]).unwrap();
        let json = categories_json(&rows).unwrap();
        assert!(json.contains("환불"));
    }

    #[test]
    fn test_load_categories_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("categories.jsonl");
        fs::write(
            &path,
            "{\"유형_1\":\"A\",\"유형_2\":\"B\",\"유형_3\":\"C\"}\n{\"유형_1\":\"D\",\"유형_2\":\"E\",\"유형_3\":\"F\"}\n",
        )
        .unwrap();

        let categories = load_categories(&path).unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[1]["level2"], json!("E"));

        let missing = temp.path().join("missing.json");
        assert!(matches!(load_categories(&missing), Err(ClassifyError::Categories(_))));
    }
}
