use std::time::Duration;

use crate::error::ClientError;
use crate::typing::DEFAULT_TYPING_TIMEOUT;

/// Where the client talks to and how it debounces typing.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base, e.g. `http://localhost:3000`
    pub base_url: String,
    /// Gateway endpoint, e.g. `ws://localhost:3000/ws`
    pub ws_url: String,
    pub token: String,
    pub typing_timeout: Duration,
}

impl ClientConfig {
    /// Derives the gateway URL from `base_url` (http -> ws, https -> wss).
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let ws_url = format!(
            "{}/ws",
            base_url.replacen("https://", "wss://", 1).replacen("http://", "ws://", 1)
        );
        Self {
            base_url,
            ws_url,
            token: token.into(),
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
        }
    }

    /// Reads `PARLEY_URL`, `PARLEY_TOKEN` and optionally
    /// `PARLEY_TYPING_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = std::env::var("PARLEY_URL").unwrap_or_else(|_| "http://localhost:3000".into());
        let token = std::env::var("PARLEY_TOKEN")
            .map_err(|_| ClientError::Config("PARLEY_TOKEN is not set".into()))?;

        let mut config = Self::new(base_url, token);
        if let Ok(ms) = std::env::var("PARLEY_TYPING_TIMEOUT_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| ClientError::Config(format!("PARLEY_TYPING_TIMEOUT_MS is not a number: {}", ms)))?;
            config.typing_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn with_typing_timeout(mut self, timeout: Duration) -> Self {
        self.typing_timeout = timeout;
        self
    }
}
