//! Error types for the RADOS Gateway admin client.

use thiserror::Error;

use crate::gateway::GatewayError;

/// Error code the admin API reports when a user already exists.
pub(crate) const USER_EXISTS_CODE: &str = "UserAlreadyExists";

/// Errors raised by [`super::RadosGateway`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RadosGatewayError {
    /// Raised when the admin endpoint cannot be turned into request URLs.
    #[error("invalid admin endpoint: {0}")]
    Endpoint(String),
    /// Raised when the HTTP client cannot be built.
    #[error("failed to build admin HTTP client: {0}")]
    Client(String),
    /// Raised when a request cannot be signed.
    #[error("failed to sign admin request: {0}")]
    Signing(String),
    /// Raised when the request never produced a response.
    #[error("admin request '{operation}' failed: {message}")]
    Transport {
        /// Admin call being made.
        operation: &'static str,
        /// Transport error text.
        message: String,
    },
    /// Raised when the admin API answers with a non-success status.
    #[error("admin API rejected '{operation}' with status {status} ({code})")]
    Api {
        /// Admin call being made.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Error code from the response body, when present.
        code: String,
    },
    /// Raised when a success response cannot be decoded.
    #[error("failed to decode '{operation}' response: {message}")]
    Decode {
        /// Admin call being made.
        operation: &'static str,
        /// Decoder message.
        message: String,
    },
    /// Raised when the admin API does not report a credential it just created.
    #[error("'{operation}' response did not include {missing}")]
    MissingCredential {
        /// Admin call being made.
        operation: &'static str,
        /// Credential that was expected.
        missing: String,
    },
}

impl RadosGatewayError {
    /// Returns true for a 404 answer from the admin API.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

impl GatewayError for RadosGatewayError {
    fn is_already_exists(&self) -> bool {
        match self {
            Self::Api { status, code, .. } => *status == 409 || code == USER_EXISTS_CODE,
            _ => false,
        }
    }
}
