pub mod auth;
pub mod contacts;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod reactions;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};

use crate::auth::AppState;

/// REST surface, mounted under `/api`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout));

    let protected_routes = Router::new()
        .route("/auth/check", get(auth::check))
        .route("/messages/contacts", get(contacts::get_all_contacts))
        .route("/messages/chats", get(contacts::get_chat_partners))
        .route("/messages/{id}", get(messages::get_messages))
        .route("/messages/send/{receiver_id}", post(messages::send_message))
        .route("/messages/{id}/reactions", post(reactions::toggle_reaction))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        .with_state(state)
}
