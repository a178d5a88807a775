use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};

use crate::{
    auth::{
        jwt::{generate_access_token, generate_refresh_token},
        password::verify_password,
    },
    config::Config,
    error::{AppError, AppResult},
    model::{
        role::Role,
        user::{LegacyAdmin, User},
    },
    models::{AuthSource, Claims, LoginResponse, Principal},
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Checks credentials against the users table, then the legacy admin table,
/// then the environment admin. The first source that knows the username
/// decides; a wrong password there is final.
pub async fn resolve_credentials(
    pool: &SqlitePool,
    config: &Config,
    username: &str,
    password: &str,
) -> AppResult<Principal> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password_hash, role, employee_code, is_active, last_login_at, created_at
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    if let Some(user) = user {
        debug!(user_id = user.id, "User found");
        if !verify_password(password, &user.password_hash) {
            info!("Invalid credentials: password mismatch");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        if !user.is_active {
            info!(user_id = user.id, "Login refused: user is deactivated");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        return Ok(Principal {
            user_id: user.id,
            username: user.username,
            role: user.role,
            employee_code: user.employee_code,
            source: AuthSource::User,
        });
    }

    let legacy = sqlx::query_as::<_, LegacyAdmin>(
        "SELECT id, username, password_hash FROM legacy_admins WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    if let Some(admin) = legacy {
        if !verify_password(password, &admin.password_hash) {
            info!("Invalid credentials: legacy admin password mismatch");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
        }
        warn!(legacy_id = admin.id, "Login through legacy admin table");
        return Ok(Principal {
            user_id: 0,
            username: admin.username,
            role: Role::Admin,
            employee_code: None,
            source: AuthSource::LegacyAdmin,
        });
    }

    if let Some((env_user, env_password)) = config.env_admin() {
        if env_user.eq_ignore_ascii_case(username) {
            if env_password != password {
                info!("Invalid credentials: env admin password mismatch");
                return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
            }
            warn!("Login through environment admin credentials");
            return Ok(Principal {
                user_id: 0,
                username: env_user.to_string(),
                role: Role::Admin,
                employee_code: None,
                source: AuthSource::Env,
            });
        }
    }

    info!("Invalid credentials: user not found");
    Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()))
}

/// Mints an access/refresh pair and persists the refresh token id.
pub async fn issue_tokens(
    pool: &SqlitePool,
    config: &Config,
    principal: &Principal,
) -> AppResult<LoginResponse> {
    let access_token =
        generate_access_token(principal, &config.jwt_secret, config.access_token_ttl)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(principal, &config.jwt_secret, config.refresh_token_ttl)?;

    store_refresh_token(pool, &refresh_claims).await?;

    Ok(LoginResponse {
        access_token,
        refresh_token,
        role: principal.role,
    })
}

async fn store_refresh_token(pool: &SqlitePool, claims: &Claims) -> AppResult<()> {
    let expires_at = DateTime::<Utc>::from_timestamp(claims.exp as i64, 0)
        .map(|d| d.naive_utc())
        .ok_or_else(|| AppError::Internal("refresh token expiry out of range".into()))?;

    debug!(jti = %claims.jti, "Storing refresh token");

    sqlx::query(
        "INSERT INTO refresh_tokens (jti, username, source, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&claims.jti)
    .bind(&claims.sub)
    .bind(claims.source.as_ref())
    .bind(expires_at)
    .execute(pool)
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to store refresh token");
        AppError::Database(e)
    })?;

    Ok(())
}

/// Marks a refresh token revoked; returns false when it was unknown or
/// already revoked.
pub async fn revoke_refresh_token(pool: &SqlitePool, jti: &str) -> AppResult<bool> {
    let result = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ? AND revoked = 0")
        .bind(jti)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Re-reads a table user so a refreshed token reflects role changes and
/// deactivation. Other sources are taken from the claims.
pub async fn refresh_principal(pool: &SqlitePool, claims: &Claims) -> AppResult<Principal> {
    if claims.source != AuthSource::User {
        return Ok(Principal::from(claims));
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password_hash, role, employee_code, is_active, last_login_at, created_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(claims.user_id)
    .fetch_optional(pool)
    .await?
    .filter(|u| u.is_active)
    .ok_or_else(|| AppError::Unauthorized("User no longer active".into()))?;

    Ok(Principal {
        user_id: user.id,
        username: user.username,
        role: user.role,
        employee_code: user.employee_code,
        source: AuthSource::User,
    })
}
