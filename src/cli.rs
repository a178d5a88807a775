use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::{
    api::users::create_user_record,
    error::AppResult,
    import::{ImportReport, ImportTarget, run_import},
    model::{role::Role, user::LegacyAdmin},
    utils::username_filter,
};

#[derive(Debug, Parser)]
#[command(name = "timeclock", version, about = "Attendance and HR records service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Import a spreadsheet (xlsx, xls or csv) into the database
    Import {
        #[arg(value_enum)]
        target: ImportTarget,
        file: PathBuf,
    },
    /// Create a user in the users table
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long, env = "TIMECLOCK_NEW_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "employee", value_parser = parse_role)]
        role: Role,
        #[arg(long)]
        employee_code: Option<String>,
    },
    /// Copy legacy admins into the users table
    MigrateLegacyAdmins,
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::from_str(raw).map_err(|_| format!("unknown role '{raw}' (admin, hr, employee)"))
}

pub async fn import_file(
    pool: &SqlitePool,
    target: ImportTarget,
    file: &Path,
) -> Result<ImportReport> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let report = run_import(pool, target, &bytes)
        .await
        .with_context(|| format!("import of {} failed", file.display()))?;
    Ok(report)
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct LegacyMigration {
    pub copied: usize,
    pub skipped: usize,
}

/// Copies each legacy admin into `users` with the admin role. Existing
/// usernames are left alone, and so are hashes that are not argon2.
pub async fn migrate_legacy_admins(pool: &SqlitePool) -> AppResult<LegacyMigration> {
    let admins = sqlx::query_as::<_, LegacyAdmin>(
        "SELECT id, username, password_hash FROM legacy_admins ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    let mut outcome = LegacyMigration::default();
    for admin in admins {
        if !admin.password_hash.starts_with("$argon2") {
            warn!(legacy_id = admin.id, "Legacy admin hash is not argon2, skipped");
            outcome.skipped += 1;
            continue;
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO users (username, password_hash, role) VALUES (?, ?, 'admin')",
        )
        .bind(&admin.username)
        .bind(&admin.password_hash)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            username_filter::insert(&admin.username);
            outcome.copied += 1;
        } else {
            info!(legacy_id = admin.id, "Username already in users, skipped");
            outcome.skipped += 1;
        }
    }

    info!(copied = outcome.copied, skipped = outcome.skipped, "Legacy admins migrated");
    Ok(outcome)
}

/// Runs every command except `serve`.
pub async fn run_command(pool: &SqlitePool, command: Command) -> Result<()> {
    match command {
        Command::Serve => {}
        Command::Import { target, file } => {
            let report = import_file(pool, target, &file).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::CreateUser {
            username,
            password,
            role,
            employee_code,
        } => {
            let user =
                create_user_record(pool, &username, &password, role, employee_code.as_deref())
                    .await
                    .context("failed to create user")?;
            println!("created user #{} {} ({})", user.id, user.username, user.role);
        }
        Command::MigrateLegacyAdmins => {
            let outcome = migrate_legacy_admins(pool).await?;
            println!("copied {}, skipped {}", outcome.copied, outcome.skipped);
        }
    }
    Ok(())
}
