//! Validation error types shared across CertMate crates.

use thiserror::Error;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors raised when user-supplied input fails validation.
///
/// These are always reported synchronously, before any external process is
/// started or any file is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Domain name does not follow the hostname grammar.
    #[error("invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: &'static str },

    /// Email address is malformed.
    #[error("invalid email '{email}': {reason}")]
    InvalidEmail { email: String, reason: &'static str },

    /// Bearer token is too short or a known placeholder.
    ///
    /// The token itself is never included in the message.
    #[error("weak API token: {0}")]
    WeakToken(&'static str),
}

impl ValidationError {
    /// Short machine-readable code for the failing field.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::InvalidDomain { .. } => "domain",
            ValidationError::InvalidEmail { .. } => "email",
            ValidationError::WeakToken(_) => "api_bearer_token",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_token_message_hides_value() {
        let err = ValidationError::WeakToken("token must be at least 32 characters long");
        let msg = err.to_string();
        assert!(msg.contains("at least 32"));
        assert_eq!(err.field(), "api_bearer_token");
    }

    #[test]
    fn test_domain_error_display() {
        let err = ValidationError::InvalidDomain {
            domain: "bad domain".to_string(),
            reason: "contains whitespace",
        };
        assert!(err.to_string().contains("bad domain"));
        assert_eq!(err.field(), "domain");
    }
}
