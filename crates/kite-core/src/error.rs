//! Error taxonomy shared by the router and the channel repository.

use kite_protocol::Payload;
use thiserror::Error;

/// Reason shown to users in place of internal failure details.
pub const INTERNAL_ERROR_REASON: &str = "Internal server error";

/// Kite errors.
///
/// Every variant except [`KiteError::Internal`] carries a message that is safe
/// to show to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KiteError {
    /// Malformed input, such as a bad channel name or a missing argument.
    #[error("{0}")]
    Validation(String),

    /// Channel name collision or a concurrent write won the race.
    #[error("{0}")]
    Conflict(String),

    /// Unknown channel or member, or nobody there to receive.
    #[error("{0}")]
    NotFound(String),

    /// No resolvable destination for a message.
    #[error("{0}")]
    Routing(String),

    /// Anything else. Never shown to users.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias for Kite operations.
pub type Result<T, E = KiteError> = std::result::Result<T, E>;

impl KiteError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn routing(msg: impl Into<String>) -> Self {
        Self::Routing(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Numeric code carried by the error payload.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            KiteError::Validation(_) => 400,
            KiteError::NotFound(_) => 404,
            KiteError::Conflict(_) => 409,
            KiteError::Internal(_) => 500,
            KiteError::Routing(_) => 502,
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            KiteError::Validation(_) => "validation",
            KiteError::Conflict(_) => "conflict",
            KiteError::NotFound(_) => "not_found",
            KiteError::Routing(_) => "routing",
            KiteError::Internal(_) => "internal",
        }
    }

    /// Convert to the `ErrorResponse` payload sent back to the user.
    #[must_use]
    pub fn to_payload(&self) -> Payload {
        let reason = match self {
            KiteError::Internal(_) => INTERNAL_ERROR_REASON.to_string(),
            other => other.to_string(),
        };
        Payload::error(reason, self.code())
    }
}
