use thiserror::Error;

use crate::domain::license::QuotaDecision;

/// Core metering errors
#[derive(Debug, Error)]
pub enum MeteringError {
    #[error("Authentication required: {message}")]
    AuthenticationRequired { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("License expired: {message}")]
    LicenseExpired { message: String },

    #[error("License suspended: {message}")]
    LicenseSuspended { message: String },

    #[error("Feature disabled: {message}")]
    FeatureDisabled { message: String },

    #[error("Quota exceeded: {message}")]
    QuotaExceeded {
        message: String,
        decision: Box<QuotaDecision>,
    },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MeteringError {
    pub fn authentication_required(message: impl Into<String>) -> Self {
        Self::AuthenticationRequired {
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn license_expired(message: impl Into<String>) -> Self {
        Self::LicenseExpired {
            message: message.into(),
        }
    }

    pub fn license_suspended(message: impl Into<String>) -> Self {
        Self::LicenseSuspended {
            message: message.into(),
        }
    }

    pub fn feature_disabled(message: impl Into<String>) -> Self {
        Self::FeatureDisabled {
            message: message.into(),
        }
    }

    /// Admission denial carrying the quota numbers needed to render an
    /// upgrade prompt.
    pub fn quota_exceeded(message: impl Into<String>, decision: QuotaDecision) -> Self {
        Self::QuotaExceeded {
            message: message.into(),
            decision: Box::new(decision),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error denies admission before the billable call runs.
    pub fn is_admission_denial(&self) -> bool {
        matches!(
            self,
            Self::LicenseExpired { .. }
                | Self::LicenseSuspended { .. }
                | Self::FeatureDisabled { .. }
                | Self::QuotaExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let error = MeteringError::not_found("License 'lic-1' not found");
        assert_eq!(error.to_string(), "Not found: License 'lic-1' not found");
    }

    #[test]
    fn test_admission_denials() {
        assert!(MeteringError::license_expired("x").is_admission_denial());
        assert!(MeteringError::feature_disabled("x").is_admission_denial());
        assert!(!MeteringError::storage("x").is_admission_denial());
    }
}
