use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::ToggleReactionRequest;
use parley_types::events::ReactionUpdate;
use parley_types::models::{ReactionChange, is_palette_emoji};

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};
use crate::middleware::Claims;

/// Toggle the caller's reaction on a message they sent or received, then
/// tell both participants.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_palette_emoji(&req.emoji) {
        return Err(ApiError::BadRequest("Unsupported reaction".into()));
    }

    let db = state.db.clone();
    let mid = message_id.to_string();
    let row = run_blocking(move || db.get_message(&mid))
        .await?
        .ok_or_else(|| ApiError::NotFound("Message not found".into()))?;

    let message = row.into_message(Vec::new())?;
    if !message.involves(claims.sub) {
        return Err(ApiError::Forbidden("Not a participant of this conversation".into()));
    }

    let db = state.db.clone();
    let relay = state.relay.clone();
    let mid = message_id.to_string();
    let uid = claims.sub.to_string();
    let emoji = req.emoji;
    let user_id = claims.sub;
    let participants = [message.sender_id, message.receiver_id];

    // Relaying inside the commit hook keeps announcements in commit order;
    // clients apply them as absolute state.
    let update_for = move |change: &ReactionChange| ReactionUpdate {
        message_id,
        user_id,
        emoji: change.current_emoji().map(str::to_string),
    };
    let change = run_blocking(move || {
        db.toggle_reaction_then(&mid, &uid, &emoji, |change| {
            relay.relay_reaction(update_for(change), participants);
        })
    })
    .await?;

    Ok(Json(update_for(&change)))
}
