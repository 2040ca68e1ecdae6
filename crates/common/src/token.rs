//! Bearer token strength policy and generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::errors::{ValidationError, ValidationResult};

/// Minimum accepted token length, in characters.
pub const MIN_TOKEN_LENGTH: usize = 32;

/// Placeholder tokens shipped in old sample configurations.
pub const INSECURE_TOKENS: &[&str] = &["change-this-token", "certmate-api-token-12345"];

/// Number of random bytes behind a generated token.
const TOKEN_BYTES: usize = 32;

/// Reject tokens that are empty, shorter than [`MIN_TOKEN_LENGTH`], or a
/// known placeholder.
pub fn enforce_token_strength(token: &str) -> ValidationResult<()> {
    if token.is_empty() {
        return Err(ValidationError::WeakToken("token must be a non-empty string"));
    }

    if token.chars().count() < MIN_TOKEN_LENGTH {
        return Err(ValidationError::WeakToken(
            "token must be at least 32 characters long",
        ));
    }

    if INSECURE_TOKENS.contains(&token) {
        return Err(ValidationError::WeakToken(
            "please use a secure, unique token",
        ));
    }

    Ok(())
}

/// Generate a cryptographically secure, URL-safe token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
