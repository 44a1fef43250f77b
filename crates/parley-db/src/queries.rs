use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};

use parley_types::models::ReactionChange;

use crate::Database;
use crate::models::{MessageRow, NewMessage, ReactionRow, UserRow, timestamp};

const USER_COLUMNS: &str = "id, full_name, email, password, profile_pic, created_at";
const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, image, temp_id, created_at";

/// Stays well under SQLite's bound-parameter limit.
const IN_CLAUSE_CHUNK: usize = 500;

impl Database {
    // -- Users --

    /// Returns false when the email is already taken.
    pub fn create_user(&self, id: &str, full_name: &str, email: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, full_name, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, full_name, email, password_hash, timestamp(Utc::now())],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Every user except `id`, alphabetically.
    pub fn list_users_except(&self, id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users WHERE id <> ?1 ORDER BY full_name", USER_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([id], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Users that exchanged at least one message with `user_id`.
    pub fn list_chat_partners(&self, user_id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE id IN (
                    SELECT receiver_id FROM messages WHERE sender_id = ?1
                    UNION
                    SELECT sender_id FROM messages WHERE receiver_id = ?1
                 ) ORDER BY full_name",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, image, temp_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.id.to_string(),
                    msg.sender_id.to_string(),
                    msg.receiver_id.to_string(),
                    msg.text,
                    msg.image,
                    msg.temp_id,
                    timestamp(msg.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
            let row = conn.query_row(&sql, [id], map_message).optional()?;
            Ok(row)
        })
    }

    /// Full history between two users, oldest first.
    pub fn get_conversation(&self, a: &str, b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![a, b], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Reactions --

    /// Toggle `user_id`'s reaction on a message: add when absent, remove when
    /// the same emoji is already set, replace when a different one is.
    pub fn toggle_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<ReactionChange> {
        self.toggle_reaction_then(message_id, user_id, emoji, |_| {})
    }

    /// Like [`Database::toggle_reaction`], but runs `on_commit` before the
    /// connection lock is released. Announcements made from `on_commit` are
    /// therefore ordered exactly like the commits.
    pub fn toggle_reaction_then<F>(
        &self,
        message_id: &str,
        user_id: &str,
        emoji: &str,
        on_commit: F,
    ) -> Result<ReactionChange>
    where
        F: FnOnce(&ReactionChange),
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT emoji FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                    params![message_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let change = match existing {
                None => {
                    tx.execute(
                        "INSERT INTO reactions (message_id, user_id, emoji, created_at) VALUES (?1, ?2, ?3, ?4)",
                        params![message_id, user_id, emoji, timestamp(Utc::now())],
                    )?;
                    ReactionChange::Added { emoji: emoji.to_string() }
                }
                Some(previous) if previous == emoji => {
                    tx.execute(
                        "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2",
                        params![message_id, user_id],
                    )?;
                    ReactionChange::Removed { emoji: previous }
                }
                Some(previous) => {
                    tx.execute(
                        "UPDATE reactions SET emoji = ?3, created_at = ?4 WHERE message_id = ?1 AND user_id = ?2",
                        params![message_id, user_id, emoji, timestamp(Utc::now())],
                    )?;
                    ReactionChange::Replaced { previous, emoji: emoji.to_string() }
                }
            };

            tx.commit()?;
            on_commit(&change);
            Ok(change)
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn get_reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let mut rows = Vec::new();
            for chunk in message_ids.chunks(IN_CLAUSE_CHUNK) {
                let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "SELECT message_id, user_id, emoji, created_at FROM reactions
                     WHERE message_id IN ({}) ORDER BY created_at",
                    placeholders.join(", ")
                );

                let mut stmt = conn.prepare(&sql)?;
                let chunk_rows = stmt
                    .query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                        Ok(ReactionRow {
                            message_id: row.get(0)?,
                            user_id: row.get(1)?,
                            emoji: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows.extend(chunk_rows);
            }
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let row = conn.query_row(&sql, [value], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_pic: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        image: row.get(4)?,
        temp_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}
