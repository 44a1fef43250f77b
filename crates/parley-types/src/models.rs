use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix carried by every client-generated temporary message key.
/// Durable ids are bare UUIDs, so a prefixed key can never collide with one.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Reactions a user may put on a message.
pub const REACTION_PALETTE: [&str; 6] = ["👍", "❤️", "😂", "😮", "😢", "🙏"];

pub fn new_temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4())
}

pub fn is_palette_emoji(emoji: &str) -> bool {
    REACTION_PALETTE.contains(&emoji)
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub profile_pic: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Optimistic,
    #[default]
    Confirmed,
    Failed,
}

/// The body of a message: exactly one of text or image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Image(String),
}

impl MessageContent {
    /// Builds the content from the optional wire fields. Blank text counts as
    /// absent. Returns `None` unless exactly one field remains.
    pub fn from_parts(text: Option<String>, image: Option<String>) -> Option<Self> {
        let text = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        let image = image.filter(|i| !i.trim().is_empty());

        match (text, image) {
            (Some(text), None) => Some(Self::Text(text)),
            (None, Some(image)) => Some(Self::Image(image)),
            _ => None,
        }
    }

    pub fn into_parts(self) -> (Option<String>, Option<String>) {
        match self {
            Self::Text(text) => (Some(text), None),
            Self::Image(image) => (None, Some(image)),
        }
    }
}

/// A direct message between two users.
///
/// Optimistic entries have `id == None` and a `temp_id`. Confirmed entries have
/// a durable `id`; their `temp_id` is only kept on the wire so the sending
/// client can match its placeholder, and is cleared once reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Message {
    pub fn optimistic(sender_id: Uuid, receiver_id: Uuid, content: MessageContent) -> Self {
        let (text, image) = content.into_parts();
        Self {
            id: None,
            temp_id: Some(new_temp_id()),
            sender_id,
            receiver_id,
            text,
            image,
            created_at: Utc::now(),
            status: MessageStatus::Optimistic,
            reactions: Vec::new(),
        }
    }

    /// True when the message was exchanged between `a` and `b`, in either direction.
    pub fn is_between(&self, a: Uuid, b: Uuid) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    /// True when `user_id` is the sender or the receiver.
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    /// The other side of the conversation from `user_id`'s point of view.
    pub fn counterpart_of(&self, user_id: Uuid) -> Uuid {
        if self.sender_id == user_id {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
}

/// Outcome of a reaction toggle for one `(user, message)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReactionChange {
    Added { emoji: String },
    Replaced { previous: String, emoji: String },
    Removed { emoji: String },
}

impl ReactionChange {
    /// The emoji the user holds after the toggle, `None` when un-reacted.
    pub fn current_emoji(&self) -> Option<&str> {
        match self {
            Self::Added { emoji } | Self::Replaced { emoji, .. } => Some(emoji),
            Self::Removed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_requires_exactly_one_field() {
        assert_eq!(
            MessageContent::from_parts(Some(" hi ".into()), None),
            Some(MessageContent::Text("hi".into()))
        );
        assert_eq!(
            MessageContent::from_parts(None, Some("https://cdn/x.png".into())),
            Some(MessageContent::Image("https://cdn/x.png".into()))
        );
        assert_eq!(MessageContent::from_parts(None, None), None);
        assert_eq!(MessageContent::from_parts(Some("   ".into()), None), None);
        assert_eq!(
            MessageContent::from_parts(Some("hi".into()), Some("https://cdn/x.png".into())),
            None
        );
    }

    #[test]
    fn temp_ids_never_parse_as_durable_ids() {
        let temp = new_temp_id();
        assert!(temp.starts_with(TEMP_ID_PREFIX));
        assert!(temp.parse::<Uuid>().is_err());
        assert_ne!(temp, new_temp_id());
    }

    #[test]
    fn counterpart_is_the_other_side() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let msg = Message::optimistic(a, b, MessageContent::Text("yo".into()));

        assert!(msg.is_between(b, a));
        assert!(!msg.is_between(a, Uuid::new_v4()));
        assert_eq!(msg.counterpart_of(a), b);
        assert_eq!(msg.counterpart_of(b), a);
        assert_eq!(msg.status, MessageStatus::Optimistic);
    }
}
