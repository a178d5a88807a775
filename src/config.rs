use anyhow::{Context, Result, bail};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting, requests per minute per peer IP; 0 disables
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_kiosk_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub upload_dir: PathBuf,
    pub max_photo_bytes: usize,
    pub max_import_bytes: usize,
    pub duplicate_window_minutes: i64,

    /// Break-glass admin, only honoured when both are set.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,

    pub log_dir: PathBuf,
    pub log_level: String,
}

fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < 16 {
            bail!("JWT_SECRET must be at least 16 characters");
        }

        Ok(Self {
            server_addr: var_or("SERVER_ADDR", "127.0.0.1:8080".to_string())?,
            database_url: var_or("DATABASE_URL", "sqlite://data/timeclock.db".to_string())?,
            jwt_secret,
            access_token_ttl: var_or("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: var_or("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: var_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: var_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_kiosk_per_min: var_or("RATE_KIOSK_PER_MIN", 120)?,
            rate_protected_per_min: var_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: var_or("API_PREFIX", "/api".to_string())?,

            upload_dir: PathBuf::from(var_or("UPLOAD_DIR", "uploads".to_string())?),
            max_photo_bytes: var_or("MAX_PHOTO_BYTES", 5 * 1024 * 1024)?,
            max_import_bytes: var_or("MAX_IMPORT_BYTES", 10 * 1024 * 1024)?,
            duplicate_window_minutes: var_or("DUPLICATE_WINDOW_MINUTES", 15)?,

            admin_username: optional("ADMIN_USERNAME"),
            admin_password: optional("ADMIN_PASSWORD"),

            log_dir: PathBuf::from(var_or("LOG_DIR", "logs".to_string())?),
            log_level: var_or("LOG_LEVEL", "info".to_string())?,
        })
    }

    /// Env admin credentials, if both halves are configured.
    pub fn env_admin(&self) -> Option<(&str, &str)> {
        match (&self.admin_username, &self.admin_password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests(upload_dir: PathBuf) -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret-with-enough-length".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            access_token_ttl: 900,
            refresh_token_ttl: 3600,
            // no peer address on test requests, so limiting stays off
            rate_login_per_min: 0,
            rate_refresh_per_min: 0,
            rate_kiosk_per_min: 0,
            rate_protected_per_min: 0,
            api_prefix: "/api".to_string(),
            upload_dir,
            max_photo_bytes: 64 * 1024,
            max_import_bytes: 1024 * 1024,
            duplicate_window_minutes: 15,
            admin_username: Some("root".to_string()),
            admin_password: Some("root-password".to_string()),
            log_dir: PathBuf::from("logs"),
            log_level: "debug".to_string(),
        }
    }
}
