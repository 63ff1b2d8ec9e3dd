//! Session identity extractor.
//!
//! The session id is an opaque, server-issued token carried in the
//! `relayguard_session` cookie as `<uuid>.<hmac-sha256-hex>`, signed
//! with the configured session secret. A request with no cookie, or one
//! whose signature fails constant-time verification, gets a freshly
//! minted identity; the handler then sets the cookie on the response so
//! the token stays stable across requests.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;

use relayguard_types::chat::SessionId;

use crate::http::error::AppError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "relayguard_session";

/// The resolved session identity for one request.
pub struct SessionIdentity {
    pub id: SessionId,
    /// Present when the identity was minted for this request and the
    /// response must set the cookie.
    fresh_token: Option<String>,
}

impl SessionIdentity {
    /// `Set-Cookie` value for a freshly issued token, if any.
    pub fn set_cookie(&self) -> Option<HeaderValue> {
        self.fresh_token.as_ref().and_then(|token| {
            HeaderValue::from_str(&format!(
                "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax"
            ))
            .ok()
        })
    }
}

impl FromRequestParts<AppState> for SessionIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let secret = state.config.session_secret.expose_secret().as_bytes();

        if let Some(token) = cookie_value(&parts.headers, SESSION_COOKIE) {
            if let Some(id) = verify_token(secret, &token) {
                return Ok(SessionIdentity {
                    id,
                    fresh_token: None,
                });
            }
            tracing::debug!("session cookie failed verification, reissuing");
        }

        let (id, token) = issue_token(secret)?;
        tracing::debug!(session = %id, "issued new session token");
        Ok(SessionIdentity {
            id,
            fresh_token: Some(token),
        })
    }
}

/// Mint a new session id and its signed cookie token.
pub fn issue_token(secret: &[u8]) -> Result<(SessionId, String), AppError> {
    let id = SessionId::new();
    let tag = sign(secret, &id.to_string())?;
    Ok((id, format!("{id}.{tag}")))
}

/// Verify a cookie token and recover the session id.
///
/// Returns `None` for any malformed or tampered token; verification is
/// constant-time via the hmac crate's `verify_slice`.
pub fn verify_token(secret: &[u8], token: &str) -> Option<SessionId> {
    let (id_text, tag_hex) = token.split_once('.')?;
    let id: SessionId = id_text.parse().ok()?;
    let tag = decode_hex(tag_hex)?;

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(id_text.as_bytes());
    mac.verify_slice(&tag).ok()?;
    Some(id)
}

/// HMAC-SHA256 tag over the id text, lowercase hex.
fn sign(secret: &[u8], id_text: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| AppError::Internal("invalid session signing key".to_string()))?;
    mac.update(id_text.as_bytes());
    let tag = mac.finalize().into_bytes();
    Ok(tag.iter().map(|b| format!("{b:02x}")).collect())
}

/// Read one cookie from the `Cookie` header.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for pair in header.split(';') {
        // Segments without '=' (flag-style cookies) are skipped, not fatal.
        let Some((key, value)) = pair.trim().split_once('=') else {
            continue;
        };
        if key == name {
            return Some(value.to_string());
        }
    }
    None
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}
