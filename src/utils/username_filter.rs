use anyhow::{Context, Result};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use std::sync::RwLock;
use tracing::info;

const INITIAL_CAPACITY: usize = 10_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Every username ever created. Grows past the initial capacity on demand.
static SEEN: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(INITIAL_CAPACITY, FALSE_POSITIVE_RATE)));

fn key(username: &str) -> String {
    username.trim().to_lowercase()
}

/// `false` means the name is certainly free. A poisoned lock answers `true`.
pub fn might_exist(username: &str) -> bool {
    SEEN.read()
        .map(|filter| filter.contains(&key(username)))
        .unwrap_or(true)
}

pub fn insert(username: &str) {
    if let Ok(mut filter) = SEEN.write() {
        filter.add(&key(username));
    }
}

pub fn remove(username: &str) {
    if let Ok(mut filter) = SEEN.write() {
        filter.remove(&key(username));
    }
}

/// Streams every username into the filter, taking the write lock once per batch.
pub async fn warmup_username_filter(pool: &SqlitePool, batch_size: usize) -> Result<usize> {
    let mut chunks = sqlx::query_scalar::<_, String>("SELECT username FROM users")
        .fetch(pool)
        .chunks(batch_size.max(1));

    let mut loaded = 0usize;
    while let Some(chunk) = chunks.next().await {
        let names = chunk
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .context("username stream failed")?;
        loaded += names.len();

        if let Ok(mut filter) = SEEN.write() {
            for name in &names {
                filter.add(&key(name));
            }
        }
    }

    info!(loaded, "Username filter warmed");
    Ok(loaded)
}
