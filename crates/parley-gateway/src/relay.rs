use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use parley_types::events::{ReactionUpdate, ServerEvent};
use parley_types::models::Message;

use crate::registry::{Connection, ConnectionId, PresenceTransition, Registry};

/// Routes events to the connections currently registered for their targets.
///
/// Delivery is best-effort and at-most-once: targets with no connection are
/// skipped, nothing is queued for later. Fan-out always iterates a snapshot of
/// the registry and only pushes onto per-connection queues, so a slow socket
/// never holds up the others.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    registry: Registry,
    /// Held across snapshot and delivery so presence updates reach every
    /// queue in the order their snapshots were taken.
    presence: Mutex<()>,
    shutdown: CancellationToken,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                registry: Registry::new(),
                presence: Mutex::new(()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Token cancelled by [`Relay::shutdown`]; connection tasks watch it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.child_token()
    }

    /// Register a freshly authenticated connection. The connection first gets
    /// its `ready` event, then everyone (it included) gets the new presence
    /// snapshot if this was the user's first connection.
    pub fn connect(&self, user_id: Uuid) -> (Connection, mpsc::UnboundedReceiver<ServerEvent>) {
        let (conn, rx) = Connection::open(user_id);
        conn.send(ServerEvent::Ready {
            user_id,
            connection_id: conn.connection_id,
        });

        let transition = self.inner.registry.register(conn.clone());
        if transition.is_some() {
            info!("{} came online", user_id);
            self.broadcast_presence();
        } else {
            // Late joiners still need the current snapshot
            let _guard = self.lock_presence();
            conn.send(ServerEvent::PresenceUpdate(self.inner.registry.snapshot_online()));
        }

        (conn, rx)
    }

    /// Drop a connection; broadcasts presence if it was the user's last one.
    pub fn disconnect(&self, user_id: Uuid, connection_id: ConnectionId) {
        if let Some(PresenceTransition::WentOffline) =
            self.inner.registry.unregister(user_id, connection_id)
        {
            info!("{} went offline", user_id);
            self.broadcast_presence();
        }
    }

    /// Send the current online list to every live connection.
    pub fn broadcast_presence(&self) -> usize {
        let _guard = self.lock_presence();
        let online = self.inner.registry.snapshot_online();
        let targets = self.inner.registry.all_connections();
        deliver(&targets, ServerEvent::PresenceUpdate(online))
    }

    /// Deliver to every connection of `target`. No connection, no delivery.
    pub fn relay_to_user(&self, target: Uuid, event: ServerEvent) -> usize {
        let targets = self.inner.registry.connections_of(target);
        if targets.is_empty() {
            debug!("{} offline, dropping {}", target, event.kind());
            return 0;
        }
        deliver(&targets, event)
    }

    /// Typing signals go to the peer only, never back to the typist.
    pub fn relay_typing(&self, from: Uuid, to: Uuid, is_typing: bool) -> usize {
        if from == to {
            return 0;
        }
        self.relay_to_user(to, ServerEvent::typing(from, is_typing))
    }

    /// Announce an already-stored message to the receiver and to every
    /// connection of the sender except `origin`, the one that sent it.
    pub fn relay_message(&self, message: &Message, origin: Option<ConnectionId>) -> usize {
        let mut targets = self.inner.registry.connections_of(message.receiver_id);
        if message.sender_id != message.receiver_id {
            targets.extend(self.inner.registry.connections_of(message.sender_id));
        }
        targets.retain(|conn| Some(conn.connection_id) != origin);

        let delivered = deliver(&targets, ServerEvent::MessageNew(message.clone()));
        debug!(
            "message {:?} from {} relayed to {} connection(s)",
            message.id, message.sender_id, delivered
        );
        delivered
    }

    /// Deliver a reaction change to both sides of the conversation.
    pub fn relay_reaction(&self, update: ReactionUpdate, participants: [Uuid; 2]) -> usize {
        let mut seen = HashSet::new();
        let targets: Vec<Connection> = participants
            .iter()
            .filter(|user_id| seen.insert(**user_id))
            .flat_map(|user_id| self.inner.registry.connections_of(*user_id))
            .collect();
        deliver(&targets, ServerEvent::ReactionUpdate(update))
    }

    /// Stop every connection task and forget all registrations.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let released = self.inner.registry.clear();
        info!("Relay shut down, released {} connection(s)", released);
    }

    fn lock_presence(&self) -> MutexGuard<'_, ()> {
        self.inner.presence.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn deliver(targets: &[Connection], event: ServerEvent) -> usize {
    let mut delivered = 0;
    for conn in targets {
        if conn.send(event.clone()) {
            delivered += 1;
        } else {
            debug!(
                "connection {} of {} already closed, skipping {}",
                conn.connection_id,
                conn.user_id,
                event.kind()
            );
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_types::models::MessageStatus;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn presence_count(events: &[ServerEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, ServerEvent::PresenceUpdate(_)))
            .count()
    }

    fn message(sender: Uuid, receiver: Uuid) -> Message {
        Message {
            id: Some(Uuid::new_v4()),
            temp_id: None,
            sender_id: sender,
            receiver_id: receiver,
            text: Some("hi".into()),
            image: None,
            created_at: Utc::now(),
            status: MessageStatus::Confirmed,
            reactions: Vec::new(),
        }
    }

    #[test]
    fn connect_sends_ready_then_presence() {
        let relay = Relay::new();
        let user = Uuid::new_v4();
        let (conn, mut rx) = relay.connect(user);

        let events = drain(&mut rx);
        assert_eq!(
            events[0],
            ServerEvent::Ready { user_id: user, connection_id: conn.connection_id }
        );
        assert_eq!(events[1], ServerEvent::PresenceUpdate(vec![user]));
    }

    #[test]
    fn losing_last_connection_broadcasts_once() {
        let relay = Relay::new();
        let watcher = Uuid::new_v4();
        let (_w, mut watcher_rx) = relay.connect(watcher);

        let user = Uuid::new_v4();
        let (tab1, _rx1) = relay.connect(user);
        let (tab2, _rx2) = relay.connect(user);
        drain(&mut watcher_rx);

        relay.disconnect(user, tab1.connection_id);
        assert_eq!(presence_count(&drain(&mut watcher_rx)), 0);
        assert!(relay.registry().is_online(user));

        relay.disconnect(user, tab2.connection_id);
        let events = drain(&mut watcher_rx);
        assert_eq!(events, vec![ServerEvent::PresenceUpdate(vec![watcher])]);
    }

    #[test]
    fn typing_reaches_peer_only() {
        let relay = Relay::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (_a, mut alice_rx) = relay.connect(alice);
        let (_b, mut bob_rx) = relay.connect(bob);
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        assert_eq!(relay.relay_typing(alice, bob, true), 1);
        assert_eq!(relay.relay_typing(alice, alice, true), 0);

        assert!(drain(&mut alice_rx).is_empty());
        assert_eq!(
            drain(&mut bob_rx),
            vec![ServerEvent::TypingStart { from_user_id: alice }]
        );
    }

    #[test]
    fn message_skips_origin_but_reaches_other_tabs() {
        let relay = Relay::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (origin, mut origin_rx) = relay.connect(alice);
        let (_other, mut other_rx) = relay.connect(alice);
        let (_b, mut bob_rx) = relay.connect(bob);
        drain(&mut origin_rx);
        drain(&mut other_rx);
        drain(&mut bob_rx);

        let msg = message(alice, bob);
        assert_eq!(relay.relay_message(&msg, Some(origin.connection_id)), 2);

        assert!(drain(&mut origin_rx).is_empty());
        assert_eq!(drain(&mut other_rx), vec![ServerEvent::MessageNew(msg.clone())]);
        assert_eq!(drain(&mut bob_rx), vec![ServerEvent::MessageNew(msg)]);
    }

    #[test]
    fn offline_target_is_a_no_op() {
        let relay = Relay::new();
        let event = ServerEvent::TypingStop { from_user_id: Uuid::new_v4() };
        assert_eq!(relay.relay_to_user(Uuid::new_v4(), event), 0);
    }

    #[test]
    fn reaction_goes_to_both_participants() {
        let relay = Relay::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (_a, mut alice_rx) = relay.connect(alice);
        let (_b, mut bob_rx) = relay.connect(bob);
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let update = ReactionUpdate {
            message_id: Uuid::new_v4(),
            user_id: bob,
            emoji: Some("👍".into()),
        };
        assert_eq!(relay.relay_reaction(update.clone(), [alice, bob]), 2);
        assert_eq!(drain(&mut alice_rx), vec![ServerEvent::ReactionUpdate(update.clone())]);
        assert_eq!(drain(&mut bob_rx), vec![ServerEvent::ReactionUpdate(update)]);
    }

    #[test]
    fn dead_connection_does_not_block_others() {
        let relay = Relay::new();
        let bob = Uuid::new_v4();
        let (_dead, dead_rx) = relay.connect(bob);
        let (_live, mut live_rx) = relay.connect(bob);
        drop(dead_rx);
        drain(&mut live_rx);

        let delivered = relay.relay_typing(Uuid::new_v4(), bob, true);
        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut live_rx).len(), 1);
    }

    #[test]
    fn last_presence_seen_matches_registry_after_flapping() {
        for _ in 0..50 {
            let relay = Relay::new();
            let watcher = Uuid::new_v4();
            let (_w, mut watcher_rx) = relay.connect(watcher);

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let relay = relay.clone();
                    std::thread::spawn(move || {
                        let user = Uuid::new_v4();
                        for i in 0..50 {
                            let (conn, _rx) = relay.connect(user);
                            // Leave some users online at the end
                            if i < 49 || user.as_u128() % 2 == 0 {
                                relay.disconnect(user, conn.connection_id);
                            }
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let last = drain(&mut watcher_rx)
                .into_iter()
                .filter_map(|e| match e {
                    ServerEvent::PresenceUpdate(online) => Some(online),
                    _ => None,
                })
                .last()
                .unwrap();
            assert_eq!(last, relay.registry().snapshot_online());
        }
    }

    #[test]
    fn shutdown_cancels_and_clears() {
        let relay = Relay::new();
        let token = relay.shutdown_token();
        let (_c, _rx) = relay.connect(Uuid::new_v4());

        relay.shutdown();
        assert!(token.is_cancelled());
        assert!(relay.registry().snapshot_online().is_empty());
    }
}
