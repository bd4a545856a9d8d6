//! Error types for cs-classify
//!
//! Centralized error handling using thiserror. Individual request failures
//! never surface here; they end up as fallback result records instead.

use thiserror::Error;

/// All error types that can abort a classification run
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Invalid or missing configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Input records could not be loaded or are malformed
    #[error("Input error: {0}")]
    Input(String),

    /// Category definition table is unusable
    #[error("Categories error: {0}")]
    Categories(String),

    /// Checkpoint could not be read or written
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// LLM client setup error
    #[error("LLM error: {0}")]
    Llm(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for cs-classify operations
pub type Result<T> = std::result::Result<T, ClassifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error() {
        let err = ClassifyError::Input("unsupported extension: xlsx".to_string());
        assert_eq!(err.to_string(), "Input error: unsupported extension: xlsx");
    }

    #[test]
    fn test_categories_error() {
        let err = ClassifyError::Categories("missing column level2".to_string());
        assert_eq!(err.to_string(), "Categories error: missing column level2");
    }

    #[test]
    fn test_checkpoint_error() {
        let err = ClassifyError::Checkpoint("rename failed".to_string());
        assert_eq!(err.to_string(), "Checkpoint error: rename failed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ClassifyError = io_err.into();
        assert!(matches!(err, ClassifyError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ClassifyError = json_err.into();
        assert!(matches!(err, ClassifyError::Json(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_err = serde_yaml::from_str::<Vec<u32>>("{not: [a list").unwrap_err();
        let err: ClassifyError = yaml_err.into();
        assert!(matches!(err, ClassifyError::Yaml(_)));
    }
}
