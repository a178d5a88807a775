use actix_web::HttpRequest;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::error;

/// Appends an activity entry. Failures are logged and swallowed: the action
/// being audited has already happened.
pub async fn record_activity(
    pool: &SqlitePool,
    username: Option<&str>,
    action: &str,
    details: Option<&str>,
    ip: Option<&str>,
) {
    if let Err(e) = sqlx::query(
        "INSERT INTO activity_logs (username, action, details, ip, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(username)
    .bind(action)
    .bind(details)
    .bind(ip)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await
    {
        error!(error = %e, action, "Failed to record activity");
    }
}

pub struct ErrorEntry<'a> {
    pub level: &'a str,
    pub message: &'a str,
    pub path: Option<&'a str>,
    pub method: Option<&'a str>,
    pub status_code: Option<u16>,
    pub details: Option<&'a str>,
    pub username: Option<&'a str>,
}

pub async fn record_error(pool: &SqlitePool, entry: ErrorEntry<'_>) {
    if let Err(e) = sqlx::query(
        r#"
        INSERT INTO error_logs (level, message, path, method, status_code, details, username, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.level)
    .bind(entry.message)
    .bind(entry.path)
    .bind(entry.method)
    .bind(entry.status_code.map(i64::from))
    .bind(entry.details)
    .bind(entry.username)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await
    {
        // the database may be the thing that is failing
        error!(error = %e, message = entry.message, "Failed to persist error log");
    }
}

pub fn client_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info().realip_remote_addr().map(str::to_string)
}
