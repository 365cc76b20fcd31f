use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::location::Fix;

/// Outcome of a single location request
pub type LocationResult = Result<Fix, LocationError>;

/// Reasons a location request can fail, none of these leave the coordinator unusable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LocationError {
    #[error("Location requests are disabled")]
    Disabled,

    #[error("Permission to access location was denied")]
    PermissionDenied,

    #[error("Location service is unavailable")]
    ServiceUnavailable,

    #[error("Timed out waiting for a location fix")]
    Timeout,

    #[error("A location request is already in progress")]
    Busy,

    #[error("Location request was cancelled")]
    Cancelled,

    #[error("Timeout must be greater than zero")]
    InvalidTimeout,
}

impl LocationError {
    /// Whether this failure came from the platform rather than the coordinator
    pub fn is_platform(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::ServiceUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_platform() {
        assert!(LocationError::PermissionDenied.is_platform());
        assert!(LocationError::ServiceUnavailable.is_platform());
        assert!(!LocationError::Timeout.is_platform());
        assert!(!LocationError::Busy.is_platform());
    }
}
