// 🚨 Adapter Errors - one taxonomy for every bank
//
// Callers branch on the variant, never on the message:
// - SessionNotFound      → no credential discoverable, fatal
// - Authentication       → bank rejected the credential, retried once by refresh.rs
// - Upstream             → malformed / unexpected response, fatal
// - Network              → transport failed before a response arrived
// - EmptyDocument / UnexpectedContentType → post-decode validation

use thiserror::Error;

/// Errors produced by any bank adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("No session found for '{bank}': {detail}")]
    SessionNotFound { bank: String, detail: String },

    #[error("Authentication rejected ({status}): {message}")]
    Authentication { status: u16, message: String },

    #[error("No eligible accounts found for '{0}'")]
    NoAccountsFound(String),

    #[error("Upstream error in {context}{}: {message}", status_suffix(.status))]
    Upstream {
        context: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Statement '{0}' decoded to an empty document")]
    EmptyDocument(String),

    #[error("Unexpected content type '{content_type}' for a {size} byte download")]
    UnexpectedContentType { content_type: String, size: usize },

    #[error("Unknown bank '{0}'")]
    UnknownBank(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {})", code),
        None => String::new(),
    }
}

impl AdapterError {
    pub fn session_not_found(bank: &str, detail: impl Into<String>) -> Self {
        Self::SessionNotFound {
            bank: bank.to_string(),
            detail: detail.into(),
        }
    }

    /// Non-2xx response that is not an authorization failure.
    pub fn upstream_status(context: &str, status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            context: context.to_string(),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Response arrived but a required field is absent or has the wrong shape.
    pub fn missing_field(context: &str, field: &str) -> Self {
        Self::Upstream {
            context: context.to_string(),
            status: None,
            message: format!("missing or malformed field '{}'", field),
        }
    }

    pub fn malformed(context: &str, message: impl Into<String>) -> Self {
        Self::Upstream {
            context: context.to_string(),
            status: None,
            message: message.into(),
        }
    }

    /// Whether the Auth-Refresh Policy applies to this failure.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        AdapterError::Network(err.to_string())
    }
}

/// Result type for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;
