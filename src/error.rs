use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, PartialEq, Error)]
pub enum PipelineError {
    #[error("unsupported file format: {0}")]
    Format(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("reconciliation failed: {0}")]
    Reconciliation(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("store unreachable: {0}")]
    Connectivity(String),
}

impl PipelineError {
    /// Maps a store failure outside of any per-row context.
    pub fn from_store(err: StoreError) -> PipelineError {
        match err {
            StoreError::Unavailable(msg) | StoreError::Ddl(msg) => PipelineError::Connectivity(msg),
            StoreError::Rejected(msg) => PipelineError::Reconciliation(msg),
        }
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, PipelineError::Connectivity(_))
    }
}

/// Result of a batch operation that keeps going after per-row failures.
///
/// `value` is the best-effort result, `errors` everything that was skipped on
/// the way. Callers that need all-or-nothing semantics use `into_result`.
#[derive(Debug, PartialEq)]
pub struct BatchOutcome<T> {
    pub value: T,
    pub errors: Vec<PipelineError>,
}

impl<T> BatchOutcome<T> {
    pub fn new(value: T, errors: Vec<PipelineError>) -> BatchOutcome<T> {
        BatchOutcome { value, errors }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<T, Vec<PipelineError>> {
        if self.errors.is_empty() {
            Ok(self.value)
        } else {
            Err(self.errors)
        }
    }
}
