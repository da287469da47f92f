use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Settings {
    pub port: u16,
    pub addr: SocketAddr,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub media_dir: PathBuf,
    pub media_base_url: String,
    pub max_upload_bytes: usize,
}

/// Reads and parses `key`, falling back to `default` when it is unset.
pub fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let port: u16 = parsed_or("PORT", 3000)?;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let max_upload_mb: usize = parsed_or("MAX_UPLOAD_MB", 100)?;

        Ok(Self {
            port,
            addr,
            database_url,
            database_max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 5)?,
            jwt_secret,
            jwt_ttl_hours: parsed_or("JWT_TTL_HOURS", 24)?,
            media_dir: env::var("MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./media")),
            media_base_url: env::var("MEDIA_BASE_URL").unwrap_or_else(|_| "/media".to_string()),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }
}
