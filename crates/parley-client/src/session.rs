use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::api::SendMessageRequest;
use parley_types::events::{ClientCommand, ReactionUpdate, ServerEvent};
use parley_types::models::{Message, MessageContent, ReactionChange};

use crate::error::ClientError;
use crate::reactions::{ReactionLog, ReactionSummary};
use crate::subscriptions::EventBus;
use crate::timeline::{Incoming, MessageWriter, Timeline};
use crate::typing::{DEFAULT_TYPING_TIMEOUT, TypingIndicator, TypingState};

/// Things the UI should surface that are not plain state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// A message arrived outside the open conversation.
    IncomingMessage { from: Uuid },
    /// An optimistic send was rolled back.
    SendFailed { peer: Uuid, temp_id: String, reason: String },
}

struct Conversation {
    timeline: Timeline,
    reactions: ReactionLog,
    typing: TypingIndicator,
}

#[derive(Default)]
struct SessionState {
    connection_id: Option<Uuid>,
    online: Vec<Uuid>,
    /// Peers currently typing to us.
    typing_peers: HashSet<Uuid>,
    unread: HashMap<Uuid, usize>,
    conversation: Option<Conversation>,
}

/// Client-side state for one logged-in user.
///
/// Fed by [`ChatSession::apply`] with gateway events; typing commands go out
/// through the `outbound` queue handed to [`ChatSession::new`].
pub struct ChatSession {
    me: Uuid,
    typing_timeout: Duration,
    outbound: mpsc::UnboundedSender<ClientCommand>,
    notices: Option<mpsc::UnboundedSender<SessionNotice>>,
    bus: EventBus,
    state: Mutex<SessionState>,
}

impl ChatSession {
    pub fn new(me: Uuid, outbound: mpsc::UnboundedSender<ClientCommand>) -> Self {
        Self {
            me,
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            outbound,
            notices: None,
            bus: EventBus::new(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn with_typing_timeout(mut self, timeout: Duration) -> Self {
        self.typing_timeout = timeout;
        self
    }

    pub fn with_notices(mut self, notices: mpsc::UnboundedSender<SessionNotice>) -> Self {
        self.notices = Some(notices);
        self
    }

    pub fn user_id(&self) -> Uuid {
        self.me
    }

    /// Subscriptions for UI layers; they run after the session state is
    /// updated.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Apply one gateway event, then hand it to any subscriber.
    pub fn apply(&self, event: ServerEvent) {
        {
            let mut state = self.lock();
            match &event {
                ServerEvent::Ready { connection_id, .. } => {
                    state.connection_id = Some(*connection_id);
                }
                ServerEvent::PresenceUpdate(online) => {
                    // A peer that dropped while typing never sends typing:stop
                    state.typing_peers.retain(|user| online.contains(user));
                    state.online = online.clone();
                }
                ServerEvent::TypingStart { from_user_id } => {
                    state.typing_peers.insert(*from_user_id);
                }
                ServerEvent::TypingStop { from_user_id } => {
                    state.typing_peers.remove(from_user_id);
                }
                ServerEvent::MessageNew(message) => self.apply_message(&mut state, message.clone()),
                ServerEvent::ReactionUpdate(update) => {
                    if let Some(conversation) = state.conversation.as_mut() {
                        conversation.reactions.apply_remote(update);
                    }
                }
            }
        }
        self.bus.dispatch(&event);
    }

    /// Drain `events` until the transport closes.
    pub async fn run(&self, events: &mut mpsc::UnboundedReceiver<ServerEvent>) {
        while let Some(event) = events.recv().await {
            self.apply(event);
        }
        info!("Event stream for {} ended", self.me);
    }

    fn apply_message(&self, state: &mut SessionState, message: Message) {
        if !message.involves(self.me) {
            return;
        }
        let counterpart = message.counterpart_of(self.me);
        let from_peer = message.sender_id != self.me;
        if from_peer {
            state.typing_peers.remove(&message.sender_id);
        }

        if let Some(conversation) = state.conversation.as_mut() {
            if conversation.timeline.peer() == counterpart {
                if let Some(id) = message.id {
                    conversation.reactions.load(id, message.reactions.clone());
                }
                let outcome = conversation.timeline.apply_incoming(message);
                debug!("message:new in open conversation: {:?}", outcome);
                return;
            }
        }

        if from_peer {
            *state.unread.entry(counterpart).or_default() += 1;
            self.notify(SessionNotice::IncomingMessage { from: counterpart });
        }
    }

    /// Switch to a conversation with `peer`, seeded from its history.
    ///
    /// Any previously open conversation is torn down first, so its typing
    /// indicator stops and its timer is cancelled.
    pub fn open_conversation(&self, peer: Uuid, history: Vec<Message>) {
        let mut state = self.lock();
        if let Some(previous) = state.conversation.take() {
            previous.typing.stop();
        }

        let mut reactions = ReactionLog::new();
        for message in &history {
            if let Some(id) = message.id {
                reactions.load(id, message.reactions.clone());
            }
        }

        state.unread.remove(&peer);
        state.conversation = Some(Conversation {
            timeline: Timeline::with_history(self.me, peer, history),
            reactions,
            typing: TypingIndicator::new(peer, self.typing_timeout, self.outbound.clone()),
        });
        debug!("Opened conversation with {}", peer);
    }

    pub fn close_conversation(&self) {
        let mut state = self.lock();
        if let Some(conversation) = state.conversation.take() {
            conversation.typing.stop();
            debug!("Closed conversation with {}", conversation.timeline.peer());
        }
    }

    /// Drop everything tied to the logged-in user.
    pub fn logout(&self) {
        self.close_conversation();
        self.bus.clear();
        *self.lock() = SessionState::default();
    }

    /// Forward a keystroke to the open conversation's typing indicator.
    pub fn on_input(&self, value: &str) {
        if let Some(conversation) = self.lock().conversation.as_ref() {
            conversation.typing.on_input(value);
        }
    }

    /// Send a message in the open conversation.
    ///
    /// The optimistic entry shows up before `writer` is awaited. On success
    /// it is replaced in place by the durable message; on failure it is
    /// removed and a [`SessionNotice::SendFailed`] is raised.
    pub async fn send<W: MessageWriter>(
        &self,
        writer: &W,
        text: Option<String>,
        image: Option<String>,
    ) -> Result<Message, ClientError> {
        let content = MessageContent::from_parts(text, image).ok_or(ClientError::InvalidDraft)?;

        let (peer, pending) = {
            let mut state = self.lock();
            let conversation = state
                .conversation
                .as_mut()
                .ok_or(ClientError::NoActiveConversation)?;
            conversation.typing.on_send();
            let pending = conversation.timeline.push_optimistic(content);
            (conversation.timeline.peer(), pending)
        };
        let Some(temp_id) = pending.temp_id.clone() else {
            return Err(ClientError::SendFailed("optimistic entry lost its temp_id".into()));
        };

        let request = SendMessageRequest {
            text: pending.text.clone(),
            image: pending.image.clone(),
            temp_id: Some(temp_id.clone()),
        };
        let result = writer.write(peer, request).await;

        let mut state = self.lock();
        let conversation = state
            .conversation
            .as_mut()
            .filter(|c| c.timeline.peer() == peer);

        match result {
            Ok(message) => {
                if let Some(conversation) = conversation {
                    conversation.timeline.confirm(&temp_id, message.clone());
                }
                Ok(message)
            }
            Err(e) => {
                warn!("Send to {} failed: {}", peer, e);
                if let Some(conversation) = conversation {
                    conversation.timeline.fail(&temp_id);
                }
                drop(state);
                self.notify(SessionNotice::SendFailed {
                    peer,
                    temp_id,
                    reason: e.to_string(),
                });
                Err(ClientError::SendFailed(e.to_string()))
            }
        }
    }

    /// Optimistically toggle our reaction in the open conversation. The
    /// server's `reaction:update` later overwrites with the real outcome.
    pub fn toggle_reaction(&self, message_id: Uuid, emoji: &str) -> Result<ReactionChange, ClientError> {
        let mut state = self.lock();
        let conversation = state
            .conversation
            .as_mut()
            .ok_or(ClientError::NoActiveConversation)?;
        Ok(conversation.reactions.toggle(message_id, self.me, emoji))
    }

    /// Apply an authoritative reaction result, e.g. the HTTP response.
    pub fn apply_reaction(&self, update: &ReactionUpdate) {
        if let Some(conversation) = self.lock().conversation.as_mut() {
            conversation.reactions.apply_remote(update);
        }
    }

    pub fn connection_id(&self) -> Option<Uuid> {
        self.lock().connection_id
    }

    pub fn active_peer(&self) -> Option<Uuid> {
        self.lock().conversation.as_ref().map(|c| c.timeline.peer())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock()
            .conversation
            .as_ref()
            .map(|c| c.timeline.entries().to_vec())
            .unwrap_or_default()
    }

    pub fn reaction_summary(&self, message_id: Uuid) -> ReactionSummary {
        self.lock()
            .conversation
            .as_ref()
            .map(|c| c.reactions.summary(message_id, self.me))
            .unwrap_or_default()
    }

    pub fn online_users(&self) -> Vec<Uuid> {
        self.lock().online.clone()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.lock().online.contains(&user_id)
    }

    pub fn is_peer_typing(&self, peer: Uuid) -> bool {
        self.lock().typing_peers.contains(&peer)
    }

    pub fn typing_state(&self) -> Option<TypingState> {
        self.lock().conversation.as_ref().map(|c| c.typing.state())
    }

    pub fn unread(&self, peer: Uuid) -> usize {
        self.lock().unread.get(&peer).copied().unwrap_or(0)
    }

    fn notify(&self, notice: SessionNotice) {
        if let Some(notices) = &self.notices {
            let _ = notices.send(notice);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
