//! Database row types. These map directly to SQLite rows; conversion into the
//! shared API models happens through the `into_*` helpers below.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use parley_types::models::{Message, MessageStatus, Reaction, User};

pub struct UserRow {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub profile_pic: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image: Option<String>,
    pub temp_id: Option<String>,
    pub created_at: String,
}

pub struct ReactionRow {
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}

/// Fields of a message about to be inserted.
pub struct NewMessage<'a> {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: Option<&'a str>,
    pub image: Option<&'a str>,
    pub temp_id: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Fixed-width RFC 3339 so text ordering equals time ordering.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{}'", raw))
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            full_name: self.full_name,
            email: self.email,
            profile_pic: self.profile_pic,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

impl ReactionRow {
    pub fn into_reaction(self) -> Result<Reaction> {
        Ok(Reaction {
            message_id: parse_id(&self.message_id)?,
            user_id: parse_id(&self.user_id)?,
            emoji: self.emoji,
        })
    }
}

impl MessageRow {
    pub fn into_message(self, reactions: Vec<Reaction>) -> Result<Message> {
        Ok(Message {
            id: Some(parse_id(&self.id)?),
            temp_id: self.temp_id,
            sender_id: parse_id(&self.sender_id)?,
            receiver_id: parse_id(&self.receiver_id)?,
            text: self.text,
            image: self.image,
            created_at: parse_timestamp(&self.created_at)?,
            status: MessageStatus::Confirmed,
            reactions,
        })
    }
}
