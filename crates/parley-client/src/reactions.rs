use std::collections::HashMap;

use uuid::Uuid;

use parley_types::events::ReactionUpdate;
use parley_types::models::{Reaction, ReactionChange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmojiCount {
    pub emoji: String,
    pub count: usize,
}

/// Display-ready view of one message's reactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionSummary {
    /// In order of first appearance on the message.
    pub counts: Vec<EmojiCount>,
    /// The local user's reaction, if any.
    pub mine: Option<String>,
}

impl ReactionSummary {
    pub fn has_reacted(&self) -> bool {
        self.mine.is_some()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|c| c.count).sum()
    }
}

/// Per-message reactions, at most one per user.
#[derive(Debug, Clone, Default)]
pub struct ReactionLog {
    by_message: HashMap<Uuid, Vec<Reaction>>,
}

impl ReactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a message's reactions wholesale (history load). A user
    /// appearing twice keeps their last entry.
    pub fn load(&mut self, message_id: Uuid, reactions: Vec<Reaction>) {
        let mut list: Vec<Reaction> = Vec::with_capacity(reactions.len());
        for reaction in reactions {
            if reaction.message_id != message_id {
                continue;
            }
            match list.iter_mut().find(|r| r.user_id == reaction.user_id) {
                Some(existing) => existing.emoji = reaction.emoji,
                None => list.push(reaction),
            }
        }
        self.by_message.insert(message_id, list);
    }

    /// Local toggle: same emoji removes, different emoji replaces, none adds.
    pub fn toggle(&mut self, message_id: Uuid, user_id: Uuid, emoji: &str) -> ReactionChange {
        let list = self.by_message.entry(message_id).or_default();

        match list.iter().position(|r| r.user_id == user_id) {
            Some(pos) if list[pos].emoji == emoji => {
                let removed = list.remove(pos);
                ReactionChange::Removed { emoji: removed.emoji }
            }
            Some(pos) => {
                let previous = std::mem::replace(&mut list[pos].emoji, emoji.to_string());
                ReactionChange::Replaced {
                    previous,
                    emoji: emoji.to_string(),
                }
            }
            None => {
                list.push(Reaction {
                    message_id,
                    user_id,
                    emoji: emoji.to_string(),
                });
                ReactionChange::Added {
                    emoji: emoji.to_string(),
                }
            }
        }
    }

    /// Apply the server's resulting state for one (message, user) pair.
    ///
    /// Absolute, not a toggle, so replaying the echo of a local toggle is
    /// harmless.
    pub fn apply_remote(&mut self, update: &ReactionUpdate) {
        let list = self.by_message.entry(update.message_id).or_default();
        let pos = list.iter().position(|r| r.user_id == update.user_id);

        match (&update.emoji, pos) {
            (Some(emoji), Some(pos)) => list[pos].emoji = emoji.clone(),
            (Some(emoji), None) => list.push(Reaction {
                message_id: update.message_id,
                user_id: update.user_id,
                emoji: emoji.clone(),
            }),
            (None, Some(pos)) => {
                list.remove(pos);
            }
            (None, None) => {}
        }
    }

    pub fn reactions_on(&self, message_id: Uuid) -> &[Reaction] {
        self.by_message
            .get(&message_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn summary(&self, message_id: Uuid, local_user: Uuid) -> ReactionSummary {
        let mut summary = ReactionSummary::default();

        for reaction in self.reactions_on(message_id) {
            match summary.counts.iter_mut().find(|c| c.emoji == reaction.emoji) {
                Some(count) => count.count += 1,
                None => summary.counts.push(EmojiCount {
                    emoji: reaction.emoji.clone(),
                    count: 1,
                }),
            }
            if reaction.user_id == local_user {
                summary.mine = Some(reaction.emoji.clone());
            }
        }
        summary
    }

    pub fn clear(&mut self) {
        self.by_message.clear();
    }
}
