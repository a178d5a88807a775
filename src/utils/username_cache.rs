use anyhow::Result;
use chrono::Utc;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::info;

/// Usernames known to be taken. A miss says nothing; ask the database.
static TAKEN: Lazy<Cache<String, ()>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(50_000)
        .time_to_live(Duration::from_secs(12 * 3600))
        .build()
});

fn key(username: &str) -> String {
    username.trim().to_lowercase()
}

pub async fn mark_taken(username: &str) {
    TAKEN.insert(key(username), ()).await;
}

pub async fn forget(username: &str) {
    TAKEN.invalidate(&key(username)).await;
}

pub async fn is_taken(username: &str) -> bool {
    TAKEN.get(&key(username)).await.is_some()
}

/// Preloads users who signed in during the last `days` days.
pub async fn warmup_username_cache(
    pool: &SqlitePool,
    days: u32,
    batch_size: usize,
) -> Result<usize> {
    let since = Utc::now().naive_utc() - chrono::Duration::days(days as i64);

    let mut chunks = sqlx::query_scalar::<_, String>(
        "SELECT username FROM users WHERE last_login_at >= ? ORDER BY last_login_at DESC",
    )
    .bind(since)
    .fetch(pool)
    .chunks(batch_size.max(1));

    let mut loaded = 0usize;
    while let Some(chunk) = chunks.next().await {
        let names = chunk.into_iter().collect::<Result<Vec<_>, _>>()?;
        loaded += names.len();
        futures::future::join_all(names.iter().map(|name| mark_taken(name))).await;
    }

    info!(loaded, days, "Username cache warmed");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[actix_web::test]
    async fn mark_and_forget() {
        mark_taken("Cache-Test-User").await;
        assert!(is_taken(" cache-test-user").await);
        forget("CACHE-TEST-USER").await;
        assert!(!is_taken("cache-test-user").await);
    }

    #[actix_web::test]
    async fn warmup_loads_only_recent_logins() {
        let pool = test_pool().await;
        let now = Utc::now().naive_utc();
        for (name, seen) in [
            ("warm-recent", Some(now)),
            ("warm-stale", Some(now - chrono::Duration::days(90))),
            ("warm-never", None),
        ] {
            sqlx::query(
                "INSERT INTO users (username, password_hash, role, last_login_at) VALUES (?, 'x', 'employee', ?)",
            )
            .bind(name)
            .bind(seen)
            .execute(&pool)
            .await
            .unwrap();
        }

        let loaded = warmup_username_cache(&pool, 30, 2).await.unwrap();
        assert_eq!(loaded, 1);
        assert!(is_taken("warm-recent").await);
        assert!(!is_taken("warm-stale").await);
    }
}
