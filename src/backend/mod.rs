//! Boundary types for the remote model backend.
//!
//! The backend is an untrusted oracle: every structured field of a response
//! is optional and callers must keep a fallback path for each of them.
pub mod command;
pub mod gemini;
pub mod retry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use command::CommandBackend;
pub use gemini::GeminiBackend;
pub use retry::{RetryPolicy, RetryingBackend};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

/// One request or response in a session transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A single generate call: prior turns plus the new prompt as the last turn.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub turns: &'a [Turn],
    /// Enable search augmentation (grounded answers with citations).
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub search: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Constrain the answer to one of these enumeration tags.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_enum: Option<&'a [String]>,
}

/// Backend answer. Only `text` is reliably present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub text: String,
    /// Enum value parsed by the backend for constrained requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<GroundingMetadata>,
}

impl GenerateResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Citation data attached to a grounded response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingMetadata {
    #[serde(default)]
    pub chunks: Vec<GroundingChunk>,
    #[serde(default)]
    pub supports: Vec<GroundingSupport>,
}

impl GroundingMetadata {
    /// Partial metadata counts as an invalid response.
    pub fn is_complete(&self) -> bool {
        !self.chunks.is_empty() && !self.supports.is_empty()
    }
}

/// A cited source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uri: String,
}

/// A span of the response text backed by one or more chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSupport {
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
    #[serde(default)]
    pub chunk_indices: Vec<usize>,
}

/// Failures talking to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Non-success HTTP status (or one reported by a command backend).
    #[error("status {status}: {message}")]
    Status { status: u16, message: String },

    /// Network or process failure before a response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response arrived but could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The backend cannot be constructed or invoked as configured.
    #[error("backend configuration error: {0}")]
    Config(String),
}

impl BackendError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A conversational model backend.
pub trait ModelBackend {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    fn generate(&self, request: &GenerateRequest<'_>) -> Result<GenerateResponse, BackendError>;
}

impl<B: ModelBackend + ?Sized> ModelBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn generate(&self, request: &GenerateRequest<'_>) -> Result<GenerateResponse, BackendError> {
        (**self).generate(request)
    }
}
