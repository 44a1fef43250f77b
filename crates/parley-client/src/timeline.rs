use std::future::Future;

use tracing::debug;
use uuid::Uuid;

use parley_types::api::SendMessageRequest;
use parley_types::models::{Message, MessageContent, MessageStatus};

use crate::error::ClientError;

/// Persists an outgoing message and returns the durable copy.
///
/// Implemented over HTTP by [`crate::http::ApiClient`]; tests substitute
/// an in-memory writer.
pub trait MessageWriter: Send + Sync {
    fn write(
        &self,
        receiver_id: Uuid,
        request: SendMessageRequest,
    ) -> impl Future<Output = Result<Message, ClientError>> + Send;
}

/// What `apply_incoming` did with a pushed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    Appended,
    /// Replaced our own optimistic entry (echo from another tab or a race
    /// with the HTTP response).
    Reconciled,
    Duplicate,
    NotInConversation,
}

/// Ordered message list for the open conversation between `me` and `peer`.
///
/// Entries are either optimistic (no `id`, carrying a `temp_id`) or
/// confirmed (durable `id`, no `temp_id`). A given `temp_id` is reconciled
/// exactly once: confirm replaces in place, fail removes.
#[derive(Debug, Clone)]
pub struct Timeline {
    me: Uuid,
    peer: Uuid,
    entries: Vec<Message>,
}

impl Timeline {
    pub fn new(me: Uuid, peer: Uuid) -> Self {
        Self {
            me,
            peer,
            entries: Vec::new(),
        }
    }

    /// Seed from server history, dropping anything outside this pair.
    pub fn with_history(me: Uuid, peer: Uuid, history: Vec<Message>) -> Self {
        let mut timeline = Self::new(me, peer);
        for message in history {
            timeline.apply_incoming(message);
        }
        timeline
    }

    pub fn peer(&self) -> Uuid {
        self.peer
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn belongs(&self, message: &Message) -> bool {
        message.is_between(self.me, self.peer)
    }

    /// Append an optimistic entry and return a copy carrying its `temp_id`.
    pub fn push_optimistic(&mut self, content: MessageContent) -> Message {
        let message = Message::optimistic(self.me, self.peer, content);
        self.entries.push(message.clone());
        message
    }

    pub fn has_pending(&self, temp_id: &str) -> bool {
        self.position_of_pending(temp_id).is_some()
    }

    /// Swap the optimistic entry for the server's copy at the same position.
    ///
    /// Returns false if nothing was pending under `temp_id` (already
    /// reconciled by an echo, or the conversation was reloaded); the durable
    /// copy is then appended only if it is not already present.
    pub fn confirm(&mut self, temp_id: &str, confirmed: Message) -> bool {
        let confirmed = settle(confirmed);

        if let Some(pos) = self.position_of_pending(temp_id) {
            self.entries[pos] = confirmed;
            return true;
        }

        match self.position_of_id(confirmed.id) {
            Some(pos) => self.entries[pos] = confirmed,
            None if self.belongs(&confirmed) => self.entries.push(confirmed),
            None => {}
        }
        false
    }

    /// Drop the optimistic entry; a failed send leaves no trace.
    pub fn fail(&mut self, temp_id: &str) -> Option<Message> {
        let pos = self.position_of_pending(temp_id)?;
        Some(self.entries.remove(pos))
    }

    /// Merge a message pushed over the gateway or loaded from history.
    pub fn apply_incoming(&mut self, message: Message) -> Incoming {
        if !self.belongs(&message) {
            return Incoming::NotInConversation;
        }

        if let Some(pos) = self.position_of_id(message.id) {
            self.entries[pos] = settle(message);
            return Incoming::Duplicate;
        }

        if message.sender_id == self.me {
            if let Some(pos) = message
                .temp_id
                .as_deref()
                .and_then(|t| self.position_of_pending(t))
            {
                debug!("Reconciled optimistic message {:?} from push", message.temp_id);
                self.entries[pos] = settle(message);
                return Incoming::Reconciled;
            }
        }

        self.entries.push(settle(message));
        Incoming::Appended
    }

    fn position_of_pending(&self, temp_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|m| m.id.is_none() && m.temp_id.as_deref() == Some(temp_id))
    }

    fn position_of_id(&self, id: Option<Uuid>) -> Option<usize> {
        let id = id?;
        self.entries.iter().position(|m| m.id == Some(id))
    }
}

fn settle(mut message: Message) -> Message {
    message.temp_id = None;
    message.status = MessageStatus::Confirmed;
    message
}
