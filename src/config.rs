//! Process configuration, loaded once at startup.
//! Everything comes from `ALCOVE_*` environment variables with sensible
//! defaults; the server binary lets CLI flags override the result. The signing
//! secret is the only hard requirement because reset tokens are worthless
//! without a stable key.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

pub const DEFAULT_HTTP_PORT: u16 = 5002;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 1800;

#[derive(Debug, Clone)]
pub struct Config {
    /// Root of all browsable paths; every stored path is relative to this.
    pub media_root: PathBuf,
    /// SQLite database file.
    pub db_path: PathBuf,
    pub http_port: u16,
    /// Server secret for reset-token signing. Required.
    pub secret_key: String,
    /// Idle lifetime of a login session.
    pub session_ttl_secs: u64,
    /// Display name used in outbound mail subjects.
    pub app_name: String,
    /// External base URL used when building reset links.
    pub public_url: String,
    /// SendGrid credentials; when absent, mail is logged instead of sent.
    pub sendgrid_api_key: Option<String>,
    pub mail_sender: Option<String>,
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let media_root = env_string("ALCOVE_MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("media"));
        let db_path = env_string("ALCOVE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("alcove.db"));
        let http_port = match env_string("ALCOVE_HTTP_PORT") {
            Some(v) => v
                .parse::<u16>()
                .with_context(|| format!("ALCOVE_HTTP_PORT is not a port number: {v}"))?,
            None => DEFAULT_HTTP_PORT,
        };
        let Some(secret_key) = env_string("ALCOVE_SECRET_KEY") else {
            bail!("ALCOVE_SECRET_KEY must be set (reset tokens are signed with it)");
        };
        let session_ttl_secs = match env_string("ALCOVE_SESSION_TTL") {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("ALCOVE_SESSION_TTL is not a number of seconds: {v}"))?,
            None => DEFAULT_SESSION_TTL_SECS,
        };
        let app_name = env_string("ALCOVE_APP_NAME").unwrap_or_else(|| "Alcove".to_string());
        let public_url = env_string("ALCOVE_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{http_port}"));

        Ok(Config {
            media_root,
            db_path,
            http_port,
            secret_key,
            session_ttl_secs,
            app_name,
            public_url,
            sendgrid_api_key: env_string("ALCOVE_SENDGRID_KEY"),
            mail_sender: env_string("ALCOVE_MAIL_SENDER"),
        })
    }

    /// Fixed settings for tests and the admin binary: explicit paths, no mail
    /// provider, throwaway secret.
    pub fn for_paths(media_root: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Config {
            media_root: media_root.into(),
            db_path: db_path.into(),
            http_port: DEFAULT_HTTP_PORT,
            secret_key: "insecure-local-secret".to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            app_name: "Alcove".to_string(),
            public_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            sendgrid_api_key: None,
            mail_sender: None,
        }
    }
}
