//! Bearer-token authorization guard
//!
//! Call [`authorize`] (or [`authorize_or_setup`]) at the top of every exposed
//! operation with the raw `Authorization` header value.

use certmate_config::Settings;
use http::StatusCode;
use thiserror::Error;
use tracing::{debug, error, warn};

pub use certmate_common::{enforce_token_strength, generate_token};

const BEARER_SCHEME: &str = "bearer";

/// Authorization failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authorization header required")]
    MissingHeader,

    #[error("Invalid authorization scheme, expected 'Bearer <token>'")]
    InvalidScheme,

    #[error("Invalid authorization header format")]
    MalformedHeader,

    #[error("Server configuration error")]
    ServerMisconfigured,

    /// The configured token fails the strength policy; every request is
    /// refused until it is replaced
    #[error("Server token is not secure")]
    WeakServerToken,

    #[error("Invalid or expired token")]
    InvalidToken,
}

impl AuthError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "AUTH_HEADER_MISSING",
            AuthError::InvalidScheme => "INVALID_AUTH_SCHEME",
            AuthError::MalformedHeader => "INVALID_AUTH_FORMAT",
            AuthError::ServerMisconfigured => "SERVER_CONFIG_ERROR",
            AuthError::WeakServerToken => "WEAK_SERVER_TOKEN",
            AuthError::InvalidToken => "INVALID_TOKEN",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::ServerMisconfigured | AuthError::WeakServerToken => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Check an `Authorization` header value against the expected token
pub fn authorize(header: Option<&str>, expected: &str) -> Result<(), AuthError> {
    let header = header.ok_or(AuthError::MissingHeader)?;

    let (scheme, presented) = header.split_once(' ').ok_or(AuthError::MalformedHeader)?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        debug!("Rejected authorization with wrong scheme");
        return Err(AuthError::InvalidScheme);
    }

    if presented.is_empty() || presented.contains(char::is_whitespace) {
        return Err(AuthError::MalformedHeader);
    }

    if expected.is_empty() {
        error!("No API bearer token configured");
        return Err(AuthError::ServerMisconfigured);
    }

    if enforce_token_strength(expected).is_err() {
        error!("Configured API bearer token is weak, refusing all requests");
        return Err(AuthError::WeakServerToken);
    }

    if !constant_time_eq(presented, expected) {
        warn!("Rejected invalid bearer token");
        return Err(AuthError::InvalidToken);
    }

    Ok(())
}

/// Like [`authorize`], but lets every request through until initial setup
/// is completed
pub fn authorize_or_setup(header: Option<&str>, settings: &Settings) -> Result<(), AuthError> {
    if !settings.is_setup_completed() {
        debug!("Setup not completed, authorization skipped");
        return Ok(());
    }
    authorize(header, &settings.api_bearer_token)
}
