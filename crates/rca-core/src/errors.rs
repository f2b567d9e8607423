//! Error types for the RCA core library.

/// Top-level error enum for the RCA core library.
#[derive(Debug, thiserror::Error)]
pub enum RcaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),
}

#[cfg(feature = "python")]
impl From<RcaError> for pyo3::PyErr {
    fn from(err: RcaError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyValueError};

        match &err {
            RcaError::Io(_) => PyIOError::new_err(err.to_string()),
            RcaError::Json(_)
            | RcaError::Metadata(_)
            | RcaError::Parse(_)
            | RcaError::Config(_) => PyValueError::new_err(err.to_string()),
        }
    }
}

pub type RcaResult<T> = Result<T, RcaError>;
