use crate::{
    auth::auth::AuthUser,
    error::AppResult,
    model::log::ActivityLog,
    models::{Page, paging},
    utils::db_utils::{FilterValue, Filters},
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use sqlx::SqlitePool;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ActivityQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub username: Option<String>,
    #[param(example = "clock_in")]
    pub action: Option<String>,
}

/// List activity logs
#[utoipa::path(
    get,
    path = "/api/activity-logs",
    params(ActivityQuery),
    responses(
        (status = 200, description = "Paginated activity", body = ActivityLogPage),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Logs"
)]
pub async fn list_activity_logs(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<ActivityQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let (page, per_page, offset) = paging(query.page, query.per_page);

    let mut filters = Filters::new();
    if let Some(username) = query.username.as_deref().filter(|u| !u.is_empty()) {
        filters.push("username = ? COLLATE NOCASE", [FilterValue::Str(username.to_string())]);
    }
    if let Some(action) = query.action.as_deref().filter(|a| !a.is_empty()) {
        filters.push("action = ?", [FilterValue::Str(action.to_string())]);
    }
    let where_sql = filters.where_sql();

    let total = filters
        .bind_scalar(sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM activity_logs{where_sql}"
        )))
        .fetch_one(pool.get_ref())
        .await?;

    let data = filters
        .bind_as(sqlx::query_as::<_, ActivityLog>(&format!(
            "SELECT id, username, action, details, ip, created_at FROM activity_logs{where_sql} \
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        )))
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Page {
        data,
        page,
        per_page,
        total,
    }))
}
