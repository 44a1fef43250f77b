use axum::{Extension, Json, extract::State, response::IntoResponse};

use parley_db::models::UserRow;
use parley_types::models::User;

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};
use crate::middleware::Claims;

/// Every other registered user.
pub async fn get_all_contacts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let rows = run_blocking(move || db.list_users_except(&me)).await?;
    Ok(Json(into_users(rows)?))
}

/// Users the caller has exchanged at least one message with.
pub async fn get_chat_partners(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let rows = run_blocking(move || db.list_chat_partners(&me)).await?;
    Ok(Json(into_users(rows)?))
}

fn into_users(rows: Vec<UserRow>) -> Result<Vec<User>, ApiError> {
    rows.into_iter()
        .map(|row| row.into_user().map_err(ApiError::from))
        .collect()
}
