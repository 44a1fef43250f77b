use axum::http::{HeaderMap, header};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};
use thiserror::Error;

use parley_types::api::Claims;

/// Name of the cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "jwt";

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("no credential presented")]
    MissingCredential,

    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] jsonwebtoken::errors::Error),
}

/// Find the presented token: `Authorization: Bearer`, then the `token` query
/// parameter (browsers cannot set headers on a WebSocket upgrade), then the
/// session cookie.
pub fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    if let Some(token) = query_token.filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

pub fn verify_token(token: &str, jwt_secret: &str) -> Result<Claims, HandshakeError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Verify the credential carried by a request. Callers must not touch the
/// registry unless this succeeds.
pub fn authenticate(
    headers: &HeaderMap,
    query_token: Option<&str>,
    jwt_secret: &str,
) -> Result<Claims, HandshakeError> {
    let token = extract_token(headers, query_token).ok_or(HandshakeError::MissingCredential)?;
    verify_token(&token, jwt_secret)
}
