use std::path::PathBuf;

/// File-level failures that abort a report run. Row-level problems are
/// recovered where they occur and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A column the status partition depends on is absent from the header.
    #[error("Report: missing required column '{0}'")]
    MissingColumn(String),

    #[error("Report: could not decode {path} with any of [{tried}]")]
    EncodingFailure { path: PathBuf, tried: String },

    #[error("Report: CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Report: I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_column_names_the_column() {
        let err = PipelineError::MissingColumn("Status".to_string());
        assert!(err.to_string().contains("'Status'"));
    }

    #[test]
    fn encoding_failure_lists_candidates() {
        let err = PipelineError::EncodingFailure {
            path: PathBuf::from("export.csv"),
            tried: "utf-8, gbk".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("export.csv"));
        assert!(msg.contains("utf-8, gbk"));
    }
}
