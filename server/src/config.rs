use anyhow::{Context, Result};
use std::env;

#[derive(Clone)]
pub struct RuntimeConfig {
    pub bind_addr: String,
    pub log_level: String,
    pub log_format: String,
    pub log_color: bool,
    pub seed_users: Vec<(String, String)>,
}

pub fn load() -> Result<RuntimeConfig> {
    let _ = dotenvy::dotenv();

    let bind_addr =
        env_str("BIND_ADDR", Some("127.0.0.1:6379".into())).context("BIND_ADDR must be set")?;
    let log_level = env_str("LOG_LEVEL", Some("info".into())).context("LOG_LEVEL must be set")?;
    let log_format =
        env_str("LOG_FORMAT", Some("pretty".into())).context("LOG_FORMAT must be set")?;
    let log_color = env_bool("LOG_COLOR", Some(true)).context("LOG_COLOR must be set")?;
    let seed_users = parse_seed_users(
        &env_str(
            "SEED_USERS",
            Some("aidan:aidan-secret,robin:robin-secret".into()),
        )
        .context("SEED_USERS must be set")?,
    )?;

    Ok(RuntimeConfig {
        bind_addr,
        log_level,
        log_format,
        log_color,
        seed_users,
    })
}

// "name:secret,name:secret" pairs; identity issuance is out of scope
fn parse_seed_users(raw: &str) -> Result<Vec<(String, String)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once(':')
                .map(|(name, secret)| (name.to_string(), secret.to_string()))
                .with_context(|| format!("seed user entry {entry:?} must look like name:secret"))
        })
        .collect()
}

fn env_str(key: &str, default: Option<String>) -> Option<String> {
    env::var(key).ok().or(default)
}

fn env_bool(key: &str, default: Option<bool>) -> Option<bool> {
    env::var(key).ok().and_then(|v| v.parse().ok()).or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_users_parse_as_pairs() {
        let users = parse_seed_users("aidan:one, robin:two").unwrap();
        assert_eq!(
            users,
            vec![
                ("aidan".to_string(), "one".to_string()),
                ("robin".to_string(), "two".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_seed_entries_are_rejected() {
        assert!(parse_seed_users("aidan").is_err());
    }
}
