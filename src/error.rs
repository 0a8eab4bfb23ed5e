use serde::Serialize;
use thiserror::Error;

use crate::scale::ScaleKind;

/// A grade value that does not belong to the scale it was read against.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("invalid grade {value:?} for the {scale} scale")]
pub struct InvalidGradeError {
    pub value: String,
    pub scale: ScaleKind,
}

impl InvalidGradeError {
    pub fn new(value: impl Into<String>, scale: ScaleKind) -> Self {
        Self {
            value: value.into(),
            scale,
        }
    }
}

/// One rejected record from a bulk computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordError {
    /// Position of the record in the input slice.
    pub index: usize,
    pub student_id: u64,
    pub competency_id: u64,
    pub error: InvalidGradeError,
}

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error(transparent)]
    InvalidGrade(#[from] InvalidGradeError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported record file format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
