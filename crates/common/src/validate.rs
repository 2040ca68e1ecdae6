//! Domain and email validation.
//!
//! Every domain that ends up on a certbot command line or in a filesystem path
//! passes through [`validate_domain`] first, so the grammar here is strict:
//! plain hostnames only, no wildcards, no whitespace, no shell metacharacters.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use crate::errors::{ValidationError, ValidationResult};

/// Maximum length of a fully qualified domain name.
pub const MAX_DOMAIN_LENGTH: usize = 253;

/// Characters that must never reach a command line or a path component.
const FORBIDDEN_CHARS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '<', '>', '\\', '\'', '"', '*', '?', '!', '{', '}', '/',
];

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?(\.[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?)*$")
        .expect("domain regex is valid")
});

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex is valid")
});

/// Validate a domain name and normalize it to lowercase.
///
/// Unlike email validation, surrounding whitespace is rejected rather than
/// trimmed.
pub fn validate_domain(domain: &str) -> ValidationResult<String> {
    let invalid = |reason| ValidationError::InvalidDomain {
        domain: domain.to_string(),
        reason,
    };

    if domain.is_empty() {
        return Err(invalid("domain must be a non-empty string"));
    }

    if domain.chars().any(char::is_whitespace) {
        return Err(invalid("domain contains whitespace"));
    }

    if domain.chars().any(|c| FORBIDDEN_CHARS.contains(&c)) {
        return Err(invalid("domain contains invalid characters"));
    }

    if domain.len() > MAX_DOMAIN_LENGTH {
        return Err(invalid("domain name too long"));
    }

    let normalized = domain.to_ascii_lowercase();
    if !DOMAIN_RE.is_match(&normalized) {
        return Err(invalid("invalid domain format"));
    }

    trace!(domain = %normalized, "Domain validated");
    Ok(normalized)
}

/// Validate an email address, returning it trimmed and lowercased.
pub fn validate_email(email: &str) -> ValidationResult<String> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidEmail {
            email: email.to_string(),
            reason: "email must be a non-empty string",
        });
    }

    if !EMAIL_RE.is_match(trimmed) {
        return Err(ValidationError::InvalidEmail {
            email: email.to_string(),
            reason: "invalid email format",
        });
    }

    Ok(trimmed.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_domains() {
        assert_eq!(validate_domain("example.org").unwrap(), "example.org");
        assert_eq!(validate_domain("Sub.Example.ORG").unwrap(), "sub.example.org");
        assert_eq!(validate_domain("a-b.c0.io").unwrap(), "a-b.c0.io");
        assert_eq!(validate_domain("localhost").unwrap(), "localhost");
    }

    #[test]
    fn test_invalid_domains() {
        for bad in [
            "",
            " example.org",
            "example.org ",
            "exa mple.org",
            "example.org;rm -rf /",
            "example.org&&id",
            "`id`.example.org",
            "*.example.org",
            "-example.org",
            "example-.org",
            "example..org",
            ".example.org",
            "example.org/../etc",
        ] {
            assert!(validate_domain(bad).is_err(), "expected rejection of {:?}", bad);
        }
    }

    #[test]
    fn test_domain_too_long() {
        let label = "a".repeat(63);
        let long = format!("{label}.{label}.{label}.{label}.com");
        assert!(long.len() > MAX_DOMAIN_LENGTH);
        assert!(validate_domain(&long).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email("  Ops@Example.org ").unwrap(),
            "ops@example.org"
        );
        assert!(validate_email("").is_err());
        assert!(validate_email("ops@example").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("ops@@example.org").is_err());
    }

    fn label() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9]([a-zA-Z0-9-]{0,20}[a-zA-Z0-9])?"
    }

    proptest! {
        #[test]
        fn prop_valid_hostnames_are_accepted_and_lowercased(
            labels in proptest::collection::vec(label(), 1..5)
        ) {
            let domain = labels.join(".");
            let validated = validate_domain(&domain).unwrap();
            prop_assert_eq!(validated, domain.to_lowercase());
        }

        #[test]
        fn prop_whitespace_or_metachar_is_rejected(
            prefix in label(),
            suffix in label(),
            bad in prop::sample::select(vec![' ', '\t', '\n', '\r', ';', '&', '|', '`', '$', '>'])
        ) {
            let domain = format!("{prefix}{bad}{suffix}.com");
            prop_assert!(validate_domain(&domain).is_err());
        }
    }
}
