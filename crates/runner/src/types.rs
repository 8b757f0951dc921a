use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// POST /run
// ---------------------------------------------------------------------------

/// Body of a run request. Every field is optional on the wire so that missing
/// values surface as `InvalidRequest` instead of a deserialization failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub output: String,
    pub execution_time: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub details: String,
}

// ---------------------------------------------------------------------------
// Execution outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("{0}")]
    CompileError(String),

    #[error("{0}")]
    RuntimeError(String),

    #[error("Code execution timed out")]
    TimeoutError,

    /// Details are logged where the failure happens and never sent to callers.
    #[error("Internal error")]
    InternalError,
}

impl ExecutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::UnsupportedLanguage(_) => "UnsupportedLanguage",
            Self::CompileError(_) => "CompileError",
            Self::RuntimeError(_) => "RuntimeError",
            Self::TimeoutError => "TimeoutError",
            Self::InternalError => "InternalError",
        }
    }

    /// Rejected before anything was written or spawned.
    pub fn is_request_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::UnsupportedLanguage(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Trimmed stdout of a successful run; empty otherwise.
    pub stdout: String,
    /// Deadline the run step was held to.
    pub time_limit: Duration,
    pub error: Option<ExecutionError>,
}

impl ExecutionResult {
    pub fn success(stdout: String, time_limit: Duration) -> Self {
        Self {
            stdout,
            time_limit,
            error: None,
        }
    }

    pub fn failure(error: ExecutionError, time_limit: Duration) -> Self {
        Self {
            stdout: String::new(),
            time_limit,
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_kind(&self) -> Option<&'static str> {
        self.error.as_ref().map(ExecutionError::kind)
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// Descriptive bound derived from the configured deadline, not a measurement.
    pub fn execution_time(&self) -> String {
        format!(
            "Executed in less than {} seconds",
            self.time_limit.as_secs_f64()
        )
    }
}
