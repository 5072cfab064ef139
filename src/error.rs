//! Unified error handling for the proximity engine.
//!
//! Provider failures, malformed input and missing ranging capability all
//! surface as one typed, inspectable error so the UI layer can branch on kind.

use thiserror::Error;

/// Unified error type for tracking, proximity and ranging operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProximityError {
    /// The user or platform refused location access
    #[error("Location permission denied")]
    PermissionDenied,

    /// The provider could not determine a position
    #[error("Position unavailable")]
    PositionUnavailable,

    /// The provider did not answer within the requested timeout
    #[error("Location request timed out")]
    Timeout,

    /// Malformed coordinates or roster entries (programming error on the caller side)
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Ranging capability absent on this platform or for this access point
    #[error("Ranging unavailable: {message}")]
    RangingUnavailable { message: String },

    /// Configuration could not be parsed or holds out-of-range values
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ProximityError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ProximityError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ProximityError::Config {
            message: message.into(),
        }
    }

    /// True for the three kinds a location provider can report.
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            ProximityError::PermissionDenied
                | ProximityError::PositionUnavailable
                | ProximityError::Timeout
        )
    }
}

impl From<serde_json::Error> for ProximityError {
    fn from(err: serde_json::Error) -> Self {
        ProximityError::config(err.to_string())
    }
}

/// Result type alias for proximity engine operations.
pub type Result<T> = std::result::Result<T, ProximityError>;
