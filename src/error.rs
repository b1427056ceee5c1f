//! Error taxonomy for the evaluation pipeline.
//!
//! Configuration errors are fatal and raised before any remote call.
//! Backend errors wrap transport failures that survived the retry policy.
//! Malformed structured output never surfaces here: it is absorbed by the
//! keyword fallback inside the evaluation protocol.
use crate::backend::BackendError;
use thiserror::Error;

/// Errors raised by record evaluation and job setup.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Missing prerequisite input (no session, bad option values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The input table lacks required columns.
    #[error("input table missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Primary-turn transport failure; propagated to the caller.
    #[error("model backend error: {0}")]
    Backend(#[from] BackendError),

    /// Grounded turn never returned both citation chunks and supports.
    #[error("grounding metadata incomplete after {attempts} attempts")]
    IncompleteGrounding { attempts: u32 },
}

impl EvalError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error must stop a job before any record is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::MissingColumns(_))
    }
}
