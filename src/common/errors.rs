//! Error taxonomy shared by the auth, transport, and workflow layers.

use thiserror::Error;

/// Precondition failures caught before any network call is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no files queued for scan")]
    NoFiles,
    #[error("no active conversion session")]
    NoSession,
    #[error("another operation of this kind is already in flight")]
    OperationInFlight,
}

/// Authentication and token lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("unauthorized")]
    Unauthorized,
    #[error("authentication request failed: {0}")]
    Network(String),
}

/// Conversion step failures reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("conversion failed")]
    Failed,
}

/// Top-level error surfaced to operation callers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Generic network/HTTP failure. Carries the message extracted from the
    /// response body `detail` field when present, else the transport error.
    #[error("{0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Human-readable message recorded as the session `error` field.
    pub fn display_message(&self) -> String {
        self.to_string()
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AppError::Auth(AuthError::Unauthorized))
    }
}
