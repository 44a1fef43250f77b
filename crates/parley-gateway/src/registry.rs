use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use uuid::Uuid;

use parley_types::events::ServerEvent;

pub type ConnectionId = Uuid;

/// One live transport session of an authenticated user.
///
/// Cloning is cheap and shares the outbound queue, so the relay can hold
/// snapshot copies while the registry keeps mutating.
#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: ConnectionId,
    pub user_id: Uuid,
    pub established_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl Connection {
    /// Create a connection and the receiving half of its outbound queue.
    pub fn open(user_id: Uuid) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self {
            connection_id: Uuid::new_v4(),
            user_id,
            established_at: Utc::now(),
            tx,
        };
        (conn, rx)
    }

    /// Queue an event without waiting on the socket. Returns false when the
    /// connection's writer is already gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// A change of a user between "has connections" and "has none".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    CameOnline,
    WentOffline,
}

struct UserConnections {
    /// Orders the presence snapshot by when the user (re)appeared
    online_seq: u64,
    connections: HashMap<ConnectionId, Connection>,
}

/// Per-user set of live connections. Source of truth for presence.
///
/// Backed by a sharded map: every mutation of a user's set runs inside that
/// key's entry guard, so concurrent connects and disconnects for one user can
/// never lose an update or report the same transition twice. A user whose
/// set becomes empty is removed immediately.
pub struct Registry {
    users: DashMap<Uuid, UserConnections>,
    next_seq: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Add a connection to its user's set. Re-registering a known connection
    /// id is a no-op. Returns `CameOnline` only when the set was empty before.
    pub fn register(&self, conn: Connection) -> Option<PresenceTransition> {
        match self.users.entry(conn.user_id) {
            Entry::Occupied(mut entry) => {
                entry
                    .get_mut()
                    .connections
                    .entry(conn.connection_id)
                    .or_insert(conn);
                None
            }
            Entry::Vacant(entry) => {
                let online_seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                let mut connections = HashMap::new();
                connections.insert(conn.connection_id, conn);
                entry.insert(UserConnections {
                    online_seq,
                    connections,
                });
                Some(PresenceTransition::CameOnline)
            }
        }
    }

    /// Remove a connection. Unknown users or connection ids are ignored.
    /// Returns `WentOffline` only when this removal emptied the set.
    pub fn unregister(&self, user_id: Uuid, connection_id: ConnectionId) -> Option<PresenceTransition> {
        let Entry::Occupied(mut entry) = self.users.entry(user_id) else {
            return None;
        };

        entry.get_mut().connections.remove(&connection_id)?;

        if entry.get().connections.is_empty() {
            entry.remove();
            Some(PresenceTransition::WentOffline)
        } else {
            None
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.users
            .get(&user_id)
            .map_or(0, |user| user.connections.len())
    }

    /// Point-in-time list of online users, oldest arrival first.
    pub fn snapshot_online(&self) -> Vec<Uuid> {
        let mut online: Vec<(u64, Uuid)> = self
            .users
            .iter()
            .map(|entry| (entry.online_seq, *entry.key()))
            .collect();
        online.sort_unstable_by_key(|(seq, _)| *seq);
        online.into_iter().map(|(_, user_id)| user_id).collect()
    }

    /// Copy of one user's connection set; empty when offline.
    pub fn connections_of(&self, user_id: Uuid) -> Vec<Connection> {
        self.users
            .get(&user_id)
            .map(|user| user.connections.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of every live connection.
    pub fn all_connections(&self) -> Vec<Connection> {
        self.users
            .iter()
            .flat_map(|entry| entry.connections.values().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Drop every entry, returning the number of connections released.
    pub fn clear(&self) -> usize {
        let released = self.all_connections().len();
        self.users.clear();
        released
    }
}
