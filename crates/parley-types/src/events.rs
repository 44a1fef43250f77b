use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// A reaction state change for one `(user, message)` pair.
/// `emoji == None` means the user's reaction was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionUpdate {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: Option<String>,
}

/// Events pushed FROM server TO client over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Handshake succeeded; sent to the new connection only
    #[serde(rename = "ready")]
    Ready { user_id: Uuid, connection_id: Uuid },

    /// Ordered list of every user with at least one live connection
    #[serde(rename = "presence:update")]
    PresenceUpdate(Vec<Uuid>),

    #[serde(rename = "typing:start")]
    TypingStart { from_user_id: Uuid },

    #[serde(rename = "typing:stop")]
    TypingStop { from_user_id: Uuid },

    /// A message that has already been durably stored
    #[serde(rename = "message:new")]
    MessageNew(Message),

    #[serde(rename = "reaction:update")]
    ReactionUpdate(ReactionUpdate),
}

impl ServerEvent {
    pub fn typing(from_user_id: Uuid, is_typing: bool) -> Self {
        if is_typing {
            Self::TypingStart { from_user_id }
        } else {
            Self::TypingStop { from_user_id }
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Ready { .. } => EventKind::Ready,
            Self::PresenceUpdate(_) => EventKind::PresenceUpdate,
            Self::TypingStart { .. } => EventKind::TypingStart,
            Self::TypingStop { .. } => EventKind::TypingStop,
            Self::MessageNew(_) => EventKind::MessageNew,
            Self::ReactionUpdate(_) => EventKind::ReactionUpdate,
        }
    }
}

/// Wire names of the server events, used as subscription keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ready,
    PresenceUpdate,
    TypingStart,
    TypingStop,
    MessageNew,
    ReactionUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::PresenceUpdate => "presence:update",
            Self::TypingStart => "typing:start",
            Self::TypingStop => "typing:stop",
            Self::MessageNew => "message:new",
            Self::ReactionUpdate => "reaction:update",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientCommand {
    #[serde(rename = "typing:start")]
    TypingStart { to_user_id: Uuid },

    #[serde(rename = "typing:stop")]
    TypingStop { to_user_id: Uuid },
}

impl ClientCommand {
    pub fn typing(to_user_id: Uuid, is_typing: bool) -> Self {
        if is_typing {
            Self::TypingStart { to_user_id }
        } else {
            Self::TypingStop { to_user_id }
        }
    }
}
