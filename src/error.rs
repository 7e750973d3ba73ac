use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

/// Failures talking to the back-office REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Session expired or credentials rejected")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        errors: BTreeMap<String, Vec<String>>,
    },

    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

/// Laravel's JSON error body: `{"message": "...", "errors": {"field": ["..."]}}`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ApiError {
    /// Builds the error for a non-success status from the raw response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = if parsed.message.is_empty() {
            body.trim().chars().take(200).collect()
        } else {
            parsed.message
        };
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            422 => ApiError::Validation {
                message,
                errors: parsed.errors,
            },
            _ => ApiError::Status { status, message },
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }

    /// Short text for the status bar. Validation errors list the first field message.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation { message, errors } => errors
                .iter()
                .find_map(|(field, msgs)| msgs.first().map(|m| format!("{field}: {m}")))
                .unwrap_or_else(|| message.clone()),
            ApiError::Transport(_) => "Could not reach the server".to_string(),
            other => other.to_string(),
        }
    }
}
