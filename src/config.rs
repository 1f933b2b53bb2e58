//! Process configuration, read from the environment once at startup.

use std::env;
use std::time::Duration;

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters long")]
    WeakSecret,
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub frontend_url: String,
    pub database_url: Option<String>,
    pub refresh_purge_every: Duration,
    /// Send `Strict-Transport-Security`; only meaningful behind TLS.
    pub enable_hsts: bool,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var: name, value: raw }),
        _ => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        let purge_secs: u64 = parsed("REFRESH_TOKEN_PURGE_SECS", 3600)?;
        if purge_secs == 0 {
            return Err(ConfigError::Invalid { var: "REFRESH_TOKEN_PURGE_SECS", value: "0".into() });
        }
        Ok(Self {
            bind_addr: var_or("BIND_ADDR", "0.0.0.0"),
            port: parsed("PORT", 8080)?,
            frontend_url: var_or("FRONTEND_URL", "http://localhost:5173"),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            refresh_purge_every: Duration::from_secs(purge_secs),
            enable_hsts: flag("ENABLE_HSTS"),
        })
    }
}

/// Object storage settings (S3 or MinIO).
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Base for public file URLs; defaults to `<endpoint>/<bucket>`.
    pub public_url: Option<String>,
    pub folder: String,
}

impl S3Config {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.trim().is_empty()),
            bucket: var_or("S3_BUCKET", "artvault-files"),
            region: var_or("S3_REGION", "us-east-1"),
            access_key: env::var("S3_ACCESS_KEY").unwrap_or_default(),
            secret_key: env::var("S3_SECRET_KEY").unwrap_or_default(),
            public_url: env::var("S3_PUBLIC_URL").ok().filter(|v| !v.trim().is_empty()),
            folder: var_or("S3_FOLDER", "uploads"),
        }
    }

    pub fn public_base(&self) -> Option<String> {
        match (&self.public_url, &self.endpoint) {
            (Some(url), _) => Some(url.trim_end_matches('/').to_string()),
            (None, Some(endpoint)) => Some(format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket)),
            (None, None) => None,
        }
    }
}
