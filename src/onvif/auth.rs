// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! WS-UsernameToken verification (spec §4.6): `PasswordText` or
//! `PasswordDigest = Base64(SHA1(nonce ++ created ++ password))`, with a
//! replay-protection window on `created`.

use base64::Engine;
use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};

/// How far `created` may drift from "now" before a digest is rejected as a
/// replay, either direction (spec §4.6 design note).
pub const REPLAY_WINDOW: chrono::Duration = chrono::Duration::minutes(5);

#[derive(Debug, Clone, Default)]
pub struct UsernameToken {
    pub username: String,
    pub password_digest: Option<String>,
    pub password_text: Option<String>,
    pub nonce_b64: Option<String>,
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    Missing,
    BadUsername,
    BadPassword,
    StaleOrFutureTimestamp,
    MalformedNonce,
    MalformedTimestamp,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthError::Missing => "no WS-UsernameToken present",
            AuthError::BadUsername => "unknown username",
            AuthError::BadPassword => "password verification failed",
            AuthError::StaleOrFutureTimestamp => "timestamp outside replay window",
            AuthError::MalformedNonce => "nonce is not valid base64",
            AuthError::MalformedTimestamp => "created is not a valid timestamp",
        };
        write!(f, "{s}")
    }
}

/// Verify a parsed token against the camera's ONVIF credentials.
pub fn verify(token: &UsernameToken, expected_username: &str, expected_password: &str) -> Result<(), AuthError> {
    verify_at(token, expected_username, expected_password, Utc::now())
}

fn verify_at(
    token: &UsernameToken,
    expected_username: &str,
    expected_password: &str,
    now: DateTime<Utc>,
) -> Result<(), AuthError> {
    if token.username.is_empty() {
        return Err(AuthError::Missing);
    }
    if token.username != expected_username {
        return Err(AuthError::BadUsername);
    }

    if let Some(digest) = &token.password_digest {
        let nonce_b64 = token.nonce_b64.as_deref().ok_or(AuthError::Missing)?;
        let created_str = token.created.as_deref().ok_or(AuthError::Missing)?;

        let created = DateTime::parse_from_rfc3339(created_str)
            .map_err(|_| AuthError::MalformedTimestamp)?
            .with_timezone(&Utc);
        if (now - created).abs() > REPLAY_WINDOW {
            return Err(AuthError::StaleOrFutureTimestamp);
        }

        let nonce_bytes = base64::engine::general_purpose::STANDARD
            .decode(nonce_b64)
            .map_err(|_| AuthError::MalformedNonce)?;

        let mut hasher = Sha1::new();
        hasher.update(&nonce_bytes);
        hasher.update(created_str.as_bytes());
        hasher.update(expected_password.as_bytes());
        let expected_digest = base64::engine::general_purpose::STANDARD.encode(hasher.finalize());

        if expected_digest == *digest {
            Ok(())
        } else {
            Err(AuthError::BadPassword)
        }
    } else if let Some(text) = &token.password_text {
        if text == expected_password {
            Ok(())
        } else {
            Err(AuthError::BadPassword)
        }
    } else {
        Err(AuthError::Missing)
    }
}
