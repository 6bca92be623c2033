use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::services::BACKGROUND_REFRESH_PERIOD;

pub struct ClientConfig {
    pub server_addr: String,
    pub member_id: String,
    pub secret: String,
    pub refresh_period: Duration,
}

pub fn load() -> Result<ClientConfig> {
    let _ = dotenvy::dotenv();

    let server_addr = env_str("SERVER_ADDR", Some("127.0.0.1:6379".into()))
        .context("SERVER_ADDR must be set")?;
    let member_id =
        env_str("CLIENT_MEMBER_ID", Some("robin".into())).context("CLIENT_MEMBER_ID must be set")?;
    let secret = env_str("CLIENT_SECRET", Some("robin-secret".into()))
        .context("CLIENT_SECRET must be set")?;
    let refresh_secs = env_u64(
        "REFRESH_PERIOD_SECS",
        Some(BACKGROUND_REFRESH_PERIOD.as_secs()),
    )
    .context("REFRESH_PERIOD_SECS must be set")?;

    Ok(ClientConfig {
        server_addr,
        member_id,
        secret,
        refresh_period: Duration::from_secs(refresh_secs),
    })
}

fn env_str(key: &str, default: Option<String>) -> Option<String> {
    env::var(key).ok().or(default)
}

fn env_u64(key: &str, default: Option<u64>) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok()).or(default)
}
