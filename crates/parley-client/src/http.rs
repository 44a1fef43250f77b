use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use parley_types::api::{CONNECTION_ID_HEADER, ErrorBody, SendMessageRequest, ToggleReactionRequest};
use parley_types::events::ReactionUpdate;
use parley_types::models::{Message, User};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::timeline::MessageWriter;

/// Thin REST client for the `/api` surface.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: String,
    connection_id: Option<Uuid>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            connection_id: None,
        }
    }

    /// Tag sends with the gateway connection from `ready`, so this tab is
    /// not echoed its own messages.
    pub fn with_connection(mut self, connection_id: Uuid) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    pub async fn contacts(&self) -> Result<Vec<User>, ClientError> {
        self.fetch(self.get("/api/messages/contacts")).await
    }

    pub async fn chat_partners(&self) -> Result<Vec<User>, ClientError> {
        self.fetch(self.get("/api/messages/chats")).await
    }

    pub async fn history(&self, peer_id: Uuid) -> Result<Vec<Message>, ClientError> {
        self.fetch(self.get(&format!("/api/messages/{}", peer_id))).await
    }

    pub async fn toggle_reaction(&self, message_id: Uuid, emoji: &str) -> Result<ReactionUpdate, ClientError> {
        let request = self
            .post(&format!("/api/messages/{}/reactions", message_id))
            .json(&ToggleReactionRequest { emoji: emoji.to_string() });
        self.fetch(request).await
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        Ok(checked(response).await?.json().await?)
    }
}

impl MessageWriter for ApiClient {
    async fn write(&self, receiver_id: Uuid, request: SendMessageRequest) -> Result<Message, ClientError> {
        let mut builder = self
            .post(&format!("/api/messages/send/{}", receiver_id))
            .json(&request);
        if let Some(connection_id) = self.connection_id {
            builder = builder.header(CONNECTION_ID_HEADER, connection_id.to_string());
        }

        let message: Message = self.fetch(builder).await?;
        debug!("Sent {:?} -> {:?}", request.temp_id, message.id);
        Ok(message)
    }
}

async fn checked(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    Err(ClientError::Rejected {
        status: status.as_u16(),
        message,
    })
}
