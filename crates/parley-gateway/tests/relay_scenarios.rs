use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use chrono::Utc;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use parley_gateway::Relay;
use parley_gateway::connection::{GatewayState, ws_upgrade};
use parley_types::events::{ReactionUpdate, ServerEvent};
use parley_types::models::{Message, MessageStatus};

fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn gateway(relay: Relay) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(GatewayState {
        relay,
        jwt_secret: Arc::from("scenario-secret"),
    })
}

#[tokio::test]
async fn unauthenticated_handshake_never_touches_registry() {
    let relay = Relay::new();
    let app = gateway(relay.clone());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/ws?token=not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(relay.registry().snapshot_online().is_empty());
}

#[tokio::test]
async fn message_to_offline_user_reaches_only_senders_other_tab() {
    let relay = Relay::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let (tab1, mut tab1_rx) = relay.connect(alice);
    let (_tab2, mut tab2_rx) = relay.connect(alice);
    drain(&mut tab1_rx);
    drain(&mut tab2_rx);

    let message = Message {
        id: Some(Uuid::new_v4()),
        temp_id: Some("temp-1".into()),
        sender_id: alice,
        receiver_id: bob,
        text: Some("are you there?".into()),
        image: None,
        created_at: Utc::now(),
        status: MessageStatus::Confirmed,
        reactions: Vec::new(),
    };

    assert!(!relay.registry().is_online(bob));
    assert_eq!(relay.relay_to_user(bob, ServerEvent::MessageNew(message.clone())), 0);
    assert_eq!(relay.relay_message(&message, Some(tab1.connection_id)), 1);

    assert!(drain(&mut tab1_rx).is_empty());
    assert_eq!(drain(&mut tab2_rx), vec![ServerEvent::MessageNew(message)]);

    // Bob comes online later: nothing was queued for him
    let (_b, mut bob_rx) = relay.connect(bob);
    let events = drain(&mut bob_rx);
    assert!(events.iter().all(|e| !matches!(e, ServerEvent::MessageNew(_))));
}

#[tokio::test]
async fn per_connection_order_follows_relay_order() {
    let relay = Relay::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let (_b, mut bob_rx) = relay.connect(bob);
    drain(&mut bob_rx);

    for i in 0..50 {
        relay.relay_typing(alice, bob, i % 2 == 0);
    }

    let events = drain(&mut bob_rx);
    assert_eq!(events.len(), 50);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(*event, ServerEvent::typing(alice, i % 2 == 0));
    }
}

#[tokio::test]
async fn concurrent_tabs_settle_to_one_presence_change_each_way() {
    let relay = Relay::new();
    let watcher = Uuid::new_v4();
    let (_w, mut watcher_rx) = relay.connect(watcher);
    drain(&mut watcher_rx);

    let user = Uuid::new_v4();
    let mut tasks = Vec::new();
    for _ in 0..16 {
        let relay = relay.clone();
        tasks.push(tokio::spawn(async move {
            let (conn, rx) = relay.connect(user);
            (conn.connection_id, rx)
        }));
    }
    let mut conns = Vec::new();
    for task in tasks {
        conns.push(task.await.unwrap());
    }

    let came_online = drain(&mut watcher_rx);
    assert_eq!(came_online, vec![ServerEvent::PresenceUpdate(vec![watcher, user])]);

    for (connection_id, _rx) in &conns {
        relay.disconnect(user, *connection_id);
    }
    assert_eq!(
        drain(&mut watcher_rx),
        vec![ServerEvent::PresenceUpdate(vec![watcher])]
    );

    let update = ReactionUpdate {
        message_id: Uuid::new_v4(),
        user_id: watcher,
        emoji: None,
    };
    assert_eq!(relay.relay_reaction(update, [watcher, user]), 1);
}
