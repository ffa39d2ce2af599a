use std::path::PathBuf;

use chrono::NaiveDate;
use polars::prelude::PolarsError;
use thiserror::Error;

/// Failures that stop a forecast run.
///
/// Individual malformed cells never surface here: they are logged and
/// become missing values. Only structural problems with the upload, an
/// unusable model artifact, or too little history abort the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("upload is missing required column '{column}'")]
    MissingColumn { column: String },

    #[error("upload contains a header but no data rows")]
    EmptyUpload,

    #[error("row {row}: cannot parse date '{value}'")]
    InvalidDate { row: usize, value: String },

    #[error("date {date} appears more than once in the upload")]
    DuplicateDate { date: NaiveDate },

    #[error("upload spans {days} calendar days, more than the allowed {max}")]
    SpanTooLong { days: usize, max: usize },

    #[error("row {row}: malformed 'Change %' value '{value}'")]
    MalformedChange { row: usize, value: String },

    #[error("insufficient history: need at least {required} usable days, got {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("failed to load model from {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("schema violation: {0}")]
    Schema(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Polars(#[from] PolarsError),
}

impl PipelineError {
    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the uploaded data rather than the model or
    /// the environment.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::MissingColumn { .. }
                | Self::EmptyUpload
                | Self::InvalidDate { .. }
                | Self::DuplicateDate { .. }
                | Self::MalformedChange { .. }
                | Self::SpanTooLong { .. }
                | Self::InsufficientHistory { .. }
        )
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
