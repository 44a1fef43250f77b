use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use parley_client::error::ClientError;
use parley_client::timeline::MessageWriter;
use parley_client::{ChatSession, SessionNotice};
use parley_types::api::SendMessageRequest;
use parley_types::events::{ClientCommand, EventKind, ReactionUpdate, ServerEvent};
use parley_types::models::{Message, MessageStatus};

/// Persists into memory once released, or rejects.
struct FakeWriter {
    me: Uuid,
    fail: bool,
    release: Notify,
    sent: Mutex<Vec<SendMessageRequest>>,
}

impl FakeWriter {
    fn new(me: Uuid, fail: bool) -> Self {
        Self {
            me,
            fail,
            release: Notify::new(),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl MessageWriter for FakeWriter {
    async fn write(&self, receiver_id: Uuid, request: SendMessageRequest) -> Result<Message, ClientError> {
        self.sent.lock().unwrap().push(request.clone());
        self.release.notified().await;

        if self.fail {
            return Err(ClientError::Rejected {
                status: 500,
                message: "disk full".into(),
            });
        }
        Ok(durable(self.me, receiver_id, request.text.as_deref().unwrap_or(""), request.temp_id))
    }
}

fn durable(from: Uuid, to: Uuid, text: &str, temp_id: Option<String>) -> Message {
    Message {
        id: Some(Uuid::new_v4()),
        temp_id,
        sender_id: from,
        receiver_id: to,
        text: Some(text.into()),
        image: None,
        created_at: Utc::now(),
        status: MessageStatus::Confirmed,
        reactions: Vec::new(),
    }
}

fn session() -> (Uuid, ChatSession, mpsc::UnboundedReceiver<ClientCommand>) {
    let me = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    (me, ChatSession::new(me, tx), rx)
}

#[tokio::test]
async fn optimistic_entry_is_replaced_in_place() {
    let (me, session, _rx) = session();
    let peer = Uuid::new_v4();
    session.open_conversation(peer, vec![durable(peer, me, "hey", None)]);
    let writer = FakeWriter::new(me, false);

    let (sent, ()) = tokio::join!(session.send(&writer, Some("hello".into()), None), async {
        tokio::task::yield_now().await;
        let pending = session.messages();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[1].status, MessageStatus::Optimistic);
        assert!(pending[1].id.is_none());
        writer.release.notify_one();
    });

    let sent = sent.unwrap();
    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].id, sent.id);
    assert_eq!(messages[1].temp_id, None);
    assert_eq!(messages[1].status, MessageStatus::Confirmed);
    assert_eq!(writer.sent.lock().unwrap()[0].text.as_deref(), Some("hello"));
}

#[tokio::test]
async fn failed_send_rolls_back_and_notifies() {
    let me = Uuid::new_v4();
    let (tx, _rx) = mpsc::unbounded_channel();
    let (notice_tx, mut notices) = mpsc::unbounded_channel();
    let session = ChatSession::new(me, tx).with_notices(notice_tx);
    let peer = Uuid::new_v4();
    session.open_conversation(peer, Vec::new());

    let writer = FakeWriter::new(me, true);
    writer.release.notify_one();
    let result = session.send(&writer, Some("doomed".into()), None).await;

    assert!(matches!(result, Err(ClientError::SendFailed(_))));
    assert!(session.messages().is_empty());
    match notices.try_recv() {
        Ok(SessionNotice::SendFailed { peer: p, temp_id, .. }) => {
            assert_eq!(p, peer);
            assert!(temp_id.starts_with("temp-"));
        }
        other => panic!("expected SendFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn push_racing_the_response_leaves_one_entry() {
    let (me, session, _rx) = session();
    let peer = Uuid::new_v4();
    session.open_conversation(peer, Vec::new());
    let writer = FakeWriter::new(me, false);

    let (sent, ()) = tokio::join!(session.send(&writer, Some("race".into()), None), async {
        tokio::task::yield_now().await;
        let temp_id = writer.sent.lock().unwrap()[0].temp_id.clone();
        session.apply(ServerEvent::MessageNew(durable(me, peer, "race", temp_id)));
        assert_eq!(session.messages().len(), 1);
        writer.release.notify_one();
    });

    assert!(sent.is_ok());
    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].temp_id, None);
}

#[tokio::test]
async fn send_requires_conversation_and_valid_draft() {
    let (me, session, _rx) = session();
    let writer = FakeWriter::new(me, false);

    let result = session.send(&writer, Some("hi".into()), None).await;
    assert!(matches!(result, Err(ClientError::NoActiveConversation)));

    session.open_conversation(Uuid::new_v4(), Vec::new());
    let result = session
        .send(&writer, Some("hi".into()), Some("https://cdn.example/a.png".into()))
        .await;
    assert!(matches!(result, Err(ClientError::InvalidDraft)));
    let result = session.send(&writer, Some("   ".into()), None).await;
    assert!(matches!(result, Err(ClientError::InvalidDraft)));
    assert!(session.messages().is_empty());
}

#[tokio::test]
async fn events_update_presence_typing_and_unread() {
    let (me, session, _rx) = session();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let connection_id = Uuid::new_v4();

    session.apply(ServerEvent::Ready { user_id: me, connection_id });
    session.apply(ServerEvent::PresenceUpdate(vec![me, alice]));
    session.apply(ServerEvent::typing(alice, true));
    assert_eq!(session.connection_id(), Some(connection_id));
    assert!(session.is_online(alice));
    assert!(!session.is_online(bob));
    assert!(session.is_peer_typing(alice));

    session.apply(ServerEvent::typing(alice, false));
    assert!(!session.is_peer_typing(alice));

    session.open_conversation(alice, Vec::new());
    session.apply(ServerEvent::MessageNew(durable(bob, me, "psst", None)));
    session.apply(ServerEvent::MessageNew(durable(alice, me, "hi", None)));
    assert_eq!(session.unread(bob), 1);
    assert_eq!(session.unread(alice), 0);
    assert_eq!(session.messages().len(), 1);

    session.open_conversation(bob, Vec::new());
    assert_eq!(session.unread(bob), 0);
}

#[tokio::test]
async fn switching_conversation_stops_typing_to_previous_peer() {
    let (_, session, mut rx) = session();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    session.open_conversation(alice, Vec::new());
    session.on_input("hel");
    session.open_conversation(bob, Vec::new());

    assert_eq!(rx.try_recv().unwrap(), ClientCommand::typing(alice, true));
    assert_eq!(rx.try_recv().unwrap(), ClientCommand::typing(alice, false));
    assert!(rx.try_recv().is_err());
    assert_eq!(session.active_peer(), Some(bob));
}

#[tokio::test]
async fn reaction_echo_does_not_double_toggle() {
    let (me, session, _rx) = session();
    let peer = Uuid::new_v4();
    let message = durable(peer, me, "nice", None);
    let message_id = message.id.unwrap();
    session.open_conversation(peer, vec![message]);

    session.toggle_reaction(message_id, "👍").unwrap();
    session.apply(ServerEvent::ReactionUpdate(ReactionUpdate {
        message_id,
        user_id: me,
        emoji: Some("👍".into()),
    }));
    session.apply(ServerEvent::ReactionUpdate(ReactionUpdate {
        message_id,
        user_id: peer,
        emoji: Some("👍".into()),
    }));

    let summary = session.reaction_summary(message_id);
    assert_eq!(summary.mine.as_deref(), Some("👍"));
    assert_eq!(summary.counts.len(), 1);
    assert_eq!(summary.counts[0].count, 2);
}

#[tokio::test]
async fn subscribers_run_after_state_and_logout_clears() {
    let (_, session, _rx) = session();
    let seen = Arc::new(AtomicUsize::new(0));
    let alice = Uuid::new_v4();

    let counter = Arc::clone(&seen);
    session.bus().subscribe(EventKind::PresenceUpdate, move |event| {
        if let ServerEvent::PresenceUpdate(online) = event {
            counter.fetch_add(online.len(), Ordering::SeqCst);
        }
    });
    session.apply(ServerEvent::PresenceUpdate(vec![alice]));
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    session.logout();
    session.apply(ServerEvent::PresenceUpdate(vec![alice]));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(session.is_online(alice));
    assert_eq!(session.active_peer(), None);
}

#[tokio::test]
async fn peer_typing_clears_when_peer_goes_offline() {
    let (me, session, _rx) = session();
    let alice = Uuid::new_v4();

    session.apply(ServerEvent::PresenceUpdate(vec![me, alice]));
    session.apply(ServerEvent::typing(alice, true));
    assert!(session.is_peer_typing(alice));

    session.apply(ServerEvent::PresenceUpdate(vec![me]));
    assert!(!session.is_online(alice));
    assert!(!session.is_peer_typing(alice));
}

#[tokio::test]
async fn peer_typing_clears_when_their_message_arrives() {
    let (me, session, _rx) = session();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    session.apply(ServerEvent::PresenceUpdate(vec![me, alice, bob]));
    session.open_conversation(alice, Vec::new());

    session.apply(ServerEvent::typing(alice, true));
    session.apply(ServerEvent::typing(bob, true));
    session.apply(ServerEvent::MessageNew(durable(alice, me, "done typing", None)));
    session.apply(ServerEvent::MessageNew(durable(bob, me, "elsewhere", None)));

    assert!(!session.is_peer_typing(alice));
    assert!(!session.is_peer_typing(bob));
}

fn drain_commands(rx: &mut mpsc::UnboundedReceiver<ClientCommand>) -> Vec<ClientCommand> {
    let mut out = Vec::new();
    while let Ok(cmd) = rx.try_recv() {
        out.push(cmd);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn closing_conversation_while_typing_stops_once() {
    let (_, session, mut rx) = session();
    let alice = Uuid::new_v4();

    session.open_conversation(alice, Vec::new());
    session.on_input("half a thought");
    session.close_conversation();
    assert_eq!(
        drain_commands(&mut rx),
        vec![ClientCommand::typing(alice, true), ClientCommand::typing(alice, false)]
    );
    assert_eq!(session.typing_state(), None);

    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    assert!(drain_commands(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn logout_while_typing_stops_once() {
    let (_, session, mut rx) = session();
    let alice = Uuid::new_v4();

    session.open_conversation(alice, Vec::new());
    session.on_input("brb");
    session.logout();
    assert_eq!(
        drain_commands(&mut rx),
        vec![ClientCommand::typing(alice, true), ClientCommand::typing(alice, false)]
    );
    assert_eq!(session.active_peer(), None);

    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    assert!(drain_commands(&mut rx).is_empty());
}
