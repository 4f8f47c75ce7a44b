//! Error types for client operations.

use thiserror::Error;

/// Response code for a request rejected because of bad parameters.
pub const INVALID_PARAM: u16 = 400;

/// Response code for any other failure.
pub const SERVER_ERROR: u16 = 500;

/// Naming errors.
///
/// A disconnected client, a client of the wrong type or a deregistration
/// against an unknown service are not errors: operations report them as
/// [`crate::operation::Outcome::Skipped`].
#[derive(Error, Debug)]
pub enum NamingError {
    /// Instance data failed a legality check.
    #[error("invalid instance {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: String,
    },

    /// An ephemeral operation targeted a persistent service.
    #[error("current service {service} is persistent service, can't {operation} ephemeral instance")]
    ServiceTypeMismatch {
        service: String,
        operation: &'static str,
    },

    /// A client with this id is already connected.
    #[error("client already connected: {0}")]
    ClientAlreadyConnected(String),

    /// Configuration could not be extracted.
    #[error("configuration error: {0}")]
    Config(Box<figment::Error>),

    /// The configuration file does not exist.
    #[error("configuration file not found: {0}")]
    ConfigFileNotFound(String),

    /// Tracing subscriber could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(String),
}

impl NamingError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Returns the response code a request handler reports for this error.
    #[must_use]
    pub const fn error_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::ServiceTypeMismatch { .. } => INVALID_PARAM,
            _ => SERVER_ERROR,
        }
    }
}

impl From<figment::Error> for NamingError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

/// Result type for naming operations.
pub type Result<T> = std::result::Result<T, NamingError>;
