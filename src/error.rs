use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// A single field-scoped validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field failure found while validating one payload, in field order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Messages reported for one field
    pub fn for_field(&self, field: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Turns the collected failures into a result for `value`
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", rendered.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Recoverable failures reported to the user by client-side operations
#[derive(Error, Debug)]
pub enum SnippetError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("you must be signed in")]
    NotSignedIn,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("snippet not found: {0}")]
    NotFound(Uuid),

    #[error("failed to copy to clipboard: {0}")]
    Clipboard(String),

    #[error("remote store request failed: {0:#}")]
    Remote(#[from] anyhow::Error),
}

impl SnippetError {
    /// Whether retrying the same action later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SnippetError::Remote(_) | SnippetError::Clipboard(_))
    }
}
