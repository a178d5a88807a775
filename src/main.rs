use actix_web::HttpServer;
use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod auth;
mod cli;
mod config;
mod db;
mod docs;
mod error;
mod import;
mod model;
mod models;
mod routes;
#[cfg(test)]
mod test_support;
mod utils;

use cli::{Cli, Command};
use config::Config;
use db::init_db;

use crate::utils::username_cache;
use crate::utils::username_filter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Rolling daily log plus stdout
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
        .with(fmt::layer().with_target(false))
        .init();

    let pool = init_db(&config.database_url).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config).await,
        command => cli::run_command(&pool, command).await,
    }
}

async fn serve(pool: sqlx::SqlitePool, config: Config) -> anyhow::Result<()> {
    info!(addr = %config.server_addr, "Server starting...");

    tokio::fs::create_dir_all(config.upload_dir.join(utils::photo::PHOTO_SUBDIR))
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;

    let pool_for_filter_warmup = pool.clone();
    let pool_for_cache_warmup = pool.clone();
    let server_addr = config.server_addr.clone();

    actix_web::rt::spawn(async move {
        if let Err(e) = username_filter::warmup_username_filter(&pool_for_filter_warmup, 100).await
        {
            error!(error = ?e, "Failed to warmup username filter");
        }
    });

    actix_web::rt::spawn(async move {
        // Warm up last 30 days of recent users in batches of 250
        if let Err(e) = username_cache::warmup_username_cache(&pool_for_cache_warmup, 30, 250).await
        {
            error!(error = ?e, "Failed to warmup username cache");
        }
    });

    HttpServer::new(move || routes::build_app(pool.clone(), config.clone()))
        .bind(&server_addr)
        .with_context(|| format!("failed to bind {server_addr}"))?
        .run()
        .await
        .context("server error")
}
