//! Runtime settings read from the environment (`.env` is loaded by the binary).

use crate::error::ConfigError;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::UnknownStore(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub store: StoreBackend,
    pub database_url: String,
    /// Schema holding the documents and naming_series tables.
    pub schema: String,
    pub bind_addr: String,
    pub max_body_bytes: usize,
    /// None disables the reminder job.
    pub reminder_interval: Option<Duration>,
    pub default_reminder_minutes: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            store: StoreBackend::Postgres,
            database_url: "postgres://localhost/crm".into(),
            schema: "crm".into(),
            bind_addr: "0.0.0.0:3000".into(),
            max_body_bytes: 2 * 1024 * 1024,
            reminder_interval: Some(Duration::from_secs(60)),
            default_reminder_minutes: 60,
        }
    }
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("static regex"))
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut s = Settings::default();
        if let Some(v) = lookup("CRM_STORE") {
            s.store = v.parse()?;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            s.database_url = v;
        }
        if let Some(v) = lookup("CRM_SCHEMA") {
            if !identifier_re().is_match(&v) {
                return Err(ConfigError::InvalidValue { key: "CRM_SCHEMA", value: v });
            }
            s.schema = v;
        }
        if let Some(v) = lookup("BIND_ADDR") {
            s.bind_addr = v;
        }
        if let Some(v) = lookup("MAX_BODY_BYTES") {
            s.max_body_bytes = parse_number("MAX_BODY_BYTES", v)?;
        }
        if let Some(v) = lookup("REMINDER_INTERVAL_SECS") {
            let secs: u64 = parse_number("REMINDER_INTERVAL_SECS", v)?;
            s.reminder_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(v) = lookup("DEFAULT_REMINDER_MINUTES") {
            s.default_reminder_minutes = parse_number("DEFAULT_REMINDER_MINUTES", v)?;
        }
        Ok(s)
    }
}
