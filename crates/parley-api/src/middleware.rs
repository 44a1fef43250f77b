use axum::{extract::{Request, State}, middleware::Next, response::Response};
use tracing::debug;

use parley_gateway::handshake;

use crate::auth::AppState;
use crate::error::ApiError;

pub use parley_types::api::Claims;

/// Validate the JWT from the `Authorization` header or the session cookie and
/// expose its claims to the handler.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = handshake::authenticate(req.headers(), None, &state.jwt_secret).map_err(|e| {
        debug!("Rejected request to {}: {}", req.uri().path(), e);
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
