//! Agent service error types

use thiserror::Error;

/// Failure of a single call to the remote agents API
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Decode, message)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Auth,
            404 => ProviderErrorKind::NotFound,
            429 => ProviderErrorKind::RateLimit,
            500..=599 => ProviderErrorKind::ServerError,
            _ => ProviderErrorKind::InvalidRequest,
        };
        Self::new(kind, format!("HTTP {status}: {body}"))
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Token acquisition failed or was rejected (401, 403)
    Auth,
    /// Connection failures, timeouts
    Network,
    /// Rate limited (429)
    RateLimit,
    /// Server error (5xx)
    ServerError,
    /// Resource does not exist (404)
    NotFound,
    /// Other 4xx
    InvalidRequest,
    /// Response body did not have the expected shape
    Decode,
}

/// Errors surfaced by the session gateway
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("AI Search connection not found: {0}")]
    ConnectionNotFound(String),
    #[error("Failed to provision agent: {0}")]
    Provisioning(#[source] ProviderError),
    #[error("No agent session has been provisioned")]
    NoSession,
    #[error("{0}")]
    Request(#[from] ProviderError),
}
