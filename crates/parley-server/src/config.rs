use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";
const MAX_TOKEN_TTL_DAYS: i64 = 3650;

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    /// Allowed browser origin; CORS is permissive when unset.
    pub client_origin: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = var("PARLEY_JWT_SECRET").unwrap_or_else(|| {
            warn!("PARLEY_JWT_SECRET not set, using an insecure development secret");
            DEV_JWT_SECRET.into()
        });

        let port = match var("PARLEY_PORT") {
            Some(port) => port.parse().context("PARLEY_PORT must be a port number")?,
            None => 3000,
        };
        let ttl_days: i64 = match var("PARLEY_TOKEN_TTL_DAYS") {
            Some(days) => days.parse().context("PARLEY_TOKEN_TTL_DAYS must be an integer")?,
            None => 7,
        };

        let token_ttl = chrono::TimeDelta::try_days(ttl_days)
            .filter(|ttl| *ttl > chrono::TimeDelta::zero() && ttl.num_days() <= MAX_TOKEN_TTL_DAYS)
            .context("PARLEY_TOKEN_TTL_DAYS is out of range")?;

        Ok(Self {
            host: var("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: PathBuf::from(var("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into())),
            jwt_secret,
            token_ttl,
            client_origin: var("PARLEY_CLIENT_ORIGIN").filter(|o| !o.is_empty()),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}
