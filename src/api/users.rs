use crate::{
    auth::{
        auth::AuthUser,
        password::{MIN_PASSWORD_LEN, hash_password},
    },
    error::{AppError, AppResult, FieldError},
    model::{
        role::Role,
        user::{User, UserView},
    },
    models::{Page, paging},
    utils::{
        audit::{client_ip, record_activity},
        db_utils::{FilterValue, Filters},
        username_cache, username_filter,
    },
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info, instrument};
use utoipa::{IntoParams, ToSchema};

const USER_COLUMNS: &str =
    "id, username, password_hash, role, employee_code, is_active, last_login_at, created_at";

const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUser {
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "change-me-please")]
    pub password: String,
    /// Defaults to `employee`
    pub role: Option<Role>,
    #[schema(example = "EMP-001")]
    pub employee_code: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateUser {
    pub password: Option<String>,
    pub role: Option<Role>,
    /// An empty string unlinks the employee record
    pub employee_code: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// admin, hr or employee
    pub role: Option<String>,
    pub search: Option<String>,
}

/// Filter says "definitely free" without touching the cache or database;
/// otherwise the cache, then the database, decide.
pub async fn username_taken(pool: &SqlitePool, username: &str) -> AppResult<bool> {
    if !username_filter::might_exist(username) {
        debug!("Username filter: definitely free");
        return Ok(false);
    }
    if username_cache::is_taken(username).await {
        debug!("Username cache: taken");
        return Ok(true);
    }

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
        .bind(username)
        .fetch_one(pool)
        .await?;

    if exists {
        username_cache::mark_taken(username).await;
    }
    Ok(exists)
}

/// Validates and stores a new user. Shared by the HTTP handler and the CLI.
pub async fn create_user_record(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    role: Role,
    employee_code: Option<&str>,
) -> AppResult<User> {
    let username = username.trim();
    let mut errors = Vec::new();
    if username.is_empty() {
        errors.push(FieldError::new("username", "is required"));
    } else if username.chars().count() > MAX_USERNAME_LEN {
        errors.push(FieldError::new(
            "username",
            format!("must be at most {MAX_USERNAME_LEN} characters"),
        ));
    }
    if password.is_empty() {
        errors.push(FieldError::new("password", "is required"));
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    if username_taken(pool, username).await? {
        return Err(AppError::Conflict("Username already exists".into()));
    }

    let employee_code = employee_code.map(str::trim).filter(|c| !c.is_empty());
    let password_hash = hash_password(password)?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (username, password_hash, role, employee_code)
        VALUES (?, ?, ?, ?)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(username)
    .bind(&password_hash)
    .bind(role)
    .bind(employee_code)
    .fetch_one(pool)
    .await
    .map_err(|e| AppError::from_write(e, "Username already exists"))?;

    username_filter::insert(&user.username);
    username_cache::mark_taken(&user.username).await;

    info!(user_id = user.id, role = %user.role, "User created");
    Ok(user)
}

async fn fetch_user(pool: &SqlitePool, id: i64) -> AppResult<User> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Create User
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = UserView),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Username already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
#[instrument(name = "create_user", skip_all, fields(username = %payload.username))]
pub async fn create_user(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    payload: web::Json<CreateUser>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let user = create_user_record(
        pool.get_ref(),
        &payload.username,
        &payload.password,
        payload.role.unwrap_or(Role::Employee),
        payload.employee_code.as_deref(),
    )
    .await?;

    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "user_created",
        Some(&format!("user #{} {} ({})", user.id, user.username, user.role)),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Created().json(UserView::from(user)))
}

/// List Users
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Paginated user list", body = UserPage),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<UserQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let (page, per_page, offset) = paging(query.page, query.per_page);

    let mut filters = Filters::new();
    if let Some(raw) = query.role.as_deref().filter(|r| !r.trim().is_empty()) {
        let role = Role::from_str(raw.trim())
            .map_err(|_| AppError::BadRequest("role must be admin, hr or employee".into()))?;
        filters.push("role = ?", [FilterValue::Str(role.to_string())]);
    }
    if let Some(term) = &query.search {
        filters.search(&["username", "employee_code"], term);
    }
    let where_sql = filters.where_sql();

    let total = filters
        .bind_scalar(sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM users{where_sql}"
        )))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql =
        format!("SELECT {USER_COLUMNS} FROM users{where_sql} ORDER BY username ASC LIMIT ? OFFSET ?");
    let users = filters
        .bind_as(sqlx::query_as::<_, User>(&data_sql))
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Page {
        data: users.into_iter().map(UserView::from).collect::<Vec<_>>(),
        page,
        per_page,
        total,
    }))
}

/// Get User
#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = UserView),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let user = fetch_user(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserView::from(user)))
}

/// Update User
#[utoipa::path(
    put,
    path = "/api/users/{user_id}",
    params(("user_id" = i64, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = UserView),
        (status = 400, description = "Validation failed or self-deactivation"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn update_user(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
    payload: web::Json<UpdateUser>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();
    let current = fetch_user(pool.get_ref(), id).await?;

    let is_self = current.id == auth.user_id;
    if is_self && payload.is_active == Some(false) {
        return Err(AppError::BadRequest("You cannot deactivate yourself".into()));
    }
    if is_self && payload.role.is_some_and(|r| r != Role::Admin) {
        return Err(AppError::BadRequest("You cannot demote yourself".into()));
    }

    let password_hash = match payload.password.as_deref() {
        None => current.password_hash,
        Some(p) if p.chars().count() < MIN_PASSWORD_LEN => {
            return Err(AppError::Validation(vec![FieldError::new(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            )]));
        }
        Some(p) => hash_password(p)?,
    };

    let employee_code = match payload.employee_code.as_deref().map(str::trim) {
        None => current.employee_code,
        Some("") => None,
        Some(code) => Some(code.to_string()),
    };

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users SET password_hash = ?, role = ?, employee_code = ?, is_active = ?
        WHERE id = ?
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&password_hash)
    .bind(payload.role.unwrap_or(current.role))
    .bind(&employee_code)
    .bind(payload.is_active.unwrap_or(current.is_active))
    .bind(id)
    .fetch_one(pool.get_ref())
    .await?;

    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "user_updated",
        Some(&format!("user #{id} {}", user.username)),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Ok().json(UserView::from(user)))
}

/// Delete User
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}",
    params(("user_id" = i64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 400, description = "Cannot delete yourself"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn delete_user(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    if id == auth.user_id {
        return Err(AppError::BadRequest("You cannot delete yourself".into()));
    }

    let username: Option<String> =
        sqlx::query_scalar("DELETE FROM users WHERE id = ? RETURNING username")
            .bind(id)
            .fetch_optional(pool.get_ref())
            .await?;

    let username = username.ok_or_else(|| AppError::NotFound("User not found".into()))?;

    username_filter::remove(&username);
    username_cache::forget(&username).await;
    // outstanding refresh tokens die with the account
    sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE username = ? AND source = 'user'")
        .bind(&username)
        .execute(pool.get_ref())
        .await?;

    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "user_deleted",
        Some(&format!("user #{id} {username}")),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}
