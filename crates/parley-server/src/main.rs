mod config;

use std::sync::Arc;

use axum::{Router, http::HeaderValue, routing::get};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::auth::{AppState, AppStateInner};
use parley_gateway::Relay;
use parley_gateway::connection::{GatewayState, ws_upgrade};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let db = Arc::new(parley_db::Database::open(&config.db_path)?);
    let relay = Relay::new();

    let app_state: AppState = Arc::new(AppStateInner {
        db,
        relay: relay.clone(),
        jwt_secret: config.jwt_secret.clone(),
        token_ttl: config.token_ttl,
    });

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(GatewayState {
            relay: relay.clone(),
            jwt_secret: Arc::from(config.jwt_secret.as_str()),
        });

    let app = parley_api::router(app_state)
        .merge(ws_route)
        .layer(cors(&config)?)
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(relay))
        .await?;

    info!("Parley server stopped");
    Ok(())
}

fn cors(config: &ServerConfig) -> anyhow::Result<CorsLayer> {
    let Some(origin) = &config.client_origin else {
        return Ok(CorsLayer::permissive());
    };
    // Cookies need a concrete origin; a wildcard would be rejected by browsers.
    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

/// Waits for ctrl-c, then closes every gateway socket so upgraded
/// connections do not hold the server open.
async fn shutdown_signal(relay: Relay) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown requested");
    relay.shutdown();
}
