use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

/// One hundred years.
const MAX_SESSION_MAX_AGE_HOURS: i64 = 24 * 365 * 100;

/// Server settings, read from `CHATTER_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_max_age_hours: i64,
    pub session_prune_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let port = var("CHATTER_PORT", "3000");
        let max_age = var("CHATTER_SESSION_MAX_AGE_HOURS", "168");
        let prune = var("CHATTER_SESSION_PRUNE_SECS", "3600");

        let config = Self {
            host: var("CHATTER_HOST", "0.0.0.0"),
            port: port
                .parse()
                .with_context(|| format!("CHATTER_PORT={:?} is not a port", port))?,
            db_path: var("CHATTER_DB_PATH", "chatter.db").into(),
            session_max_age_hours: max_age
                .parse()
                .with_context(|| format!("CHATTER_SESSION_MAX_AGE_HOURS={:?}", max_age))?,
            session_prune_secs: prune
                .parse()
                .with_context(|| format!("CHATTER_SESSION_PRUNE_SECS={:?}", prune))?,
        };

        anyhow::ensure!(
            (1..=MAX_SESSION_MAX_AGE_HOURS).contains(&config.session_max_age_hours),
            "CHATTER_SESSION_MAX_AGE_HOURS must be between 1 and {}",
            MAX_SESSION_MAX_AGE_HOURS
        );
        anyhow::ensure!(
            config.session_prune_secs > 0,
            "CHATTER_SESSION_PRUNE_SECS must be positive"
        );
        Ok(config)
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn session_max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_max_age_hours)
    }
}
