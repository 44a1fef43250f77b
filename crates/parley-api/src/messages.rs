use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use parley_db::models::NewMessage;
use parley_types::api::{CONNECTION_ID_HEADER, SendMessageRequest};
use parley_types::models::{Message, MessageContent, MessageStatus, Reaction, TEMP_ID_PREFIX};

use crate::auth::AppState;
use crate::error::{ApiError, run_blocking};
use crate::middleware::Claims;

/// Store a message, then announce it over the gateway.
///
/// The relay call happens strictly after the insert committed; it only
/// notifies connections of a fact that is already durable.
pub async fn send_message(
    State(state): State<AppState>,
    Path(receiver_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = MessageContent::from_parts(req.text, req.image)
        .ok_or_else(|| ApiError::BadRequest("Exactly one of text or image is required".into()))?;

    if claims.sub == receiver_id {
        return Err(ApiError::BadRequest("You cannot send a message to yourself".into()));
    }

    if let Some(temp_id) = &req.temp_id {
        if !temp_id.starts_with(TEMP_ID_PREFIX) || temp_id.len() > 64 {
            return Err(ApiError::BadRequest("Malformed temp_id".into()));
        }
    }

    let origin = headers
        .get(CONNECTION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Uuid>().ok());

    let db = state.db.clone();
    let receiver_exists = run_blocking(move || db.user_exists(&receiver_id.to_string())).await?;
    if !receiver_exists {
        return Err(ApiError::NotFound("Receiver not found".into()));
    }

    let (text, image) = content.into_parts();
    let id = Uuid::new_v4();
    let message = Message {
        id: Some(id),
        temp_id: req.temp_id,
        sender_id: claims.sub,
        receiver_id,
        text,
        image,
        created_at: Utc::now(),
        status: MessageStatus::Confirmed,
        reactions: Vec::new(),
    };

    let db = state.db.clone();
    let stored = message.clone();
    run_blocking(move || {
        db.insert_message(&NewMessage {
            id,
            sender_id: stored.sender_id,
            receiver_id: stored.receiver_id,
            text: stored.text.as_deref(),
            image: stored.image.as_deref(),
            temp_id: stored.temp_id.as_deref(),
            created_at: stored.created_at,
        })
    })
    .await?;

    let delivered = state.relay.relay_message(&message, origin);
    debug!(
        "{} -> {}: stored message, notified {} connection(s)",
        message.sender_id, message.receiver_id, delivered
    );

    Ok((StatusCode::CREATED, Json(message)))
}

/// Conversation history between the caller and `peer_id`, oldest first,
/// with every reaction attached.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let peer = peer_id.to_string();

    let (rows, reaction_rows) = run_blocking(move || {
        let rows = db.get_conversation(&me, &peer)?;
        let message_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let reaction_rows = db.get_reactions_for_messages(&message_ids)?;
        Ok((rows, reaction_rows))
    })
    .await?;

    let mut by_message: HashMap<String, Vec<Reaction>> = HashMap::new();
    for row in reaction_rows {
        let message_id = row.message_id.clone();
        match row.into_reaction() {
            Ok(reaction) => by_message.entry(message_id).or_default().push(reaction),
            Err(e) => warn!("Skipping corrupt reaction on message '{}': {:#}", message_id, e),
        }
    }

    let messages: Vec<Message> = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            let reactions = by_message.remove(&id).unwrap_or_default();
            row.into_message(reactions)
                .map_err(|e| warn!("Skipping corrupt message '{}': {:#}", id, e))
                .ok()
        })
        .collect();

    Ok(Json(messages))
}
