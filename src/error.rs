use thiserror::Error;

/// Failures of the data-access side. The aggregation engine itself never
/// fails; the session turns these into empty slices.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, ReportError>;
