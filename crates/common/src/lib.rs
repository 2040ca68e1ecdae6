//! CertMate common primitives
//!
//! Validation helpers and the bearer-token policy shared by the settings
//! store, the certificate orchestrator and the authorization guard.

pub mod errors;
pub mod token;
pub mod validate;

pub use errors::{ValidationError, ValidationResult};
pub use token::{enforce_token_strength, generate_token, INSECURE_TOKENS, MIN_TOKEN_LENGTH};
pub use validate::{validate_domain, validate_email, MAX_DOMAIN_LENGTH};
