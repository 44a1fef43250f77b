use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no conversation is open")]
    NoActiveConversation,

    #[error("a message needs exactly one of text or image")]
    InvalidDraft,
}
