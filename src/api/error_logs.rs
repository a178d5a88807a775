use crate::{
    api::attendance::csv_response,
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::log::ErrorLog,
    models::{Page, paging},
    utils::{
        audit::{client_ip, record_activity},
        db_utils::{FilterValue, Filters, date_range},
    },
};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;
use utoipa::IntoParams;

const ERROR_LOG_COLUMNS: &str =
    "id, level, message, path, method, status_code, details, username, created_at";

#[derive(Debug, Deserialize, IntoParams)]
pub struct ErrorLogQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[param(example = "error")]
    pub level: Option<String>,
    /// Matches message, path or details
    pub search: Option<String>,
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ClearQuery {
    /// Only delete entries older than this many days; all when omitted
    pub older_than_days: Option<u32>,
}

fn log_filters(query: &ErrorLogQuery) -> Filters {
    let mut filters = Filters::new();
    if let Some(level) = query.level.as_deref().filter(|l| !l.trim().is_empty()) {
        filters.push("level = ?", [FilterValue::Str(level.trim().to_lowercase())]);
    }
    if let Some(term) = &query.search {
        filters.search(&["message", "path", "details"], term);
    }
    date_range(&mut filters, "created_at", query.from, query.to);
    filters
}

/// List error logs
#[utoipa::path(
    get,
    path = "/api/error-logs",
    params(ErrorLogQuery),
    responses(
        (status = 200, description = "Paginated error logs", body = ErrorLogPage),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Logs"
)]
pub async fn list_error_logs(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<ErrorLogQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let (page, per_page, offset) = paging(query.page, query.per_page);
    let filters = log_filters(&query);
    let where_sql = filters.where_sql();

    let total = filters
        .bind_scalar(sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM error_logs{where_sql}"
        )))
        .fetch_one(pool.get_ref())
        .await?;

    let data = filters
        .bind_as(sqlx::query_as::<_, ErrorLog>(&format!(
            "SELECT {ERROR_LOG_COLUMNS} FROM error_logs{where_sql} \
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

/// Get error log
#[utoipa::path(
    get,
    path = "/api/error-logs/{log_id}",
    params(("log_id" = i64, Path, description = "Error log ID")),
    responses(
        (status = 200, description = "Found", body = ErrorLog),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Logs"
)]
pub async fn get_error_log(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let log = sqlx::query_as::<_, ErrorLog>(&format!(
        "SELECT {ERROR_LOG_COLUMNS} FROM error_logs WHERE id = ?"
    ))
    .bind(path.into_inner())
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::NotFound("Error log not found".into()))?;

    Ok(HttpResponse::Ok().json(log))
}

/// Export error logs as CSV
#[utoipa::path(
    get,
    path = "/api/error-logs/export",
    params(ErrorLogQuery),
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Logs"
)]
pub async fn export_error_logs(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<ErrorLogQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let filters = log_filters(&query);

    let rows = filters
        .bind_as(sqlx::query_as::<_, ErrorLog>(&format!(
            "SELECT {ERROR_LOG_COLUMNS} FROM error_logs{} ORDER BY created_at DESC, id DESC",
            filters.where_sql()
        )))
        .fetch_all(pool.get_ref())
        .await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_err = |e: csv::Error| AppError::Internal(e.to_string());

    writer
        .write_record([
            "id",
            "created_at",
            "level",
            "status_code",
            "method",
            "path",
            "username",
            "message",
            "details",
        ])
        .map_err(csv_err)?;

    for log in &rows {
        writer
            .write_record([
                log.id.to_string(),
                log.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                log.level.clone(),
                log.status_code.map(|s| s.to_string()).unwrap_or_default(),
                log.method.clone().unwrap_or_default(),
                log.path.clone().unwrap_or_default(),
                log.username.clone().unwrap_or_default(),
                log.message.clone(),
                log.details.clone().unwrap_or_default(),
            ])
            .map_err(csv_err)?;
    }

    let body = writer
        .into_inner()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(csv_response("error_logs.csv", body))
}

/// Delete error log
#[utoipa::path(
    delete,
    path = "/api/error-logs/{log_id}",
    params(("log_id" = i64, Path, description = "Error log ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Logs"
)]
pub async fn delete_error_log(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let result = sqlx::query("DELETE FROM error_logs WHERE id = ?")
        .bind(path.into_inner())
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Error log not found".into()));
    }
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

/// Clear error logs
#[utoipa::path(
    delete,
    path = "/api/error-logs",
    params(ClearQuery),
    responses(
        (status = 200, description = "Number of deleted entries", body = Object, example = json!({
            "deleted": 12
        })),
        (status = 400, description = "older_than_days out of range"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Logs"
)]
pub async fn clear_error_logs(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<ClearQuery>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let result = match query.older_than_days {
        Some(days) => {
            let cutoff = Utc::now()
                .naive_utc()
                .checked_sub_signed(Duration::days(days as i64))
                .ok_or_else(|| AppError::BadRequest("older_than_days is out of range".into()))?;
            sqlx::query("DELETE FROM error_logs WHERE created_at < ?")
                .bind(cutoff)
                .execute(pool.get_ref())
                .await?
        }
        None => {
            sqlx::query("DELETE FROM error_logs")
                .execute(pool.get_ref())
                .await?
        }
    };

    let deleted = result.rows_affected();
    info!(deleted, older_than_days = ?query.older_than_days, "Error logs cleared");
    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "error_logs_cleared",
        Some(&format!("{deleted} entries")),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "deleted": deleted })))
}

#[cfg(test)]
mod tests {
    use crate::{
        model::role::Role,
        test_support::TestContext,
        utils::audit::{ErrorEntry, record_error},
    };
    use actix_web::{http::StatusCode, test};
    use chrono::{Duration, Utc};
    use serde_json::Value;

    async fn seed(ctx: &TestContext) {
        for message in ["db locked", "disk full"] {
            record_error(
                &ctx.pool,
                ErrorEntry {
                    level: "error",
                    message,
                    path: Some("/api/attendance"),
                    method: Some("POST"),
                    status_code: Some(500),
                    details: None,
                    username: Some("alice"),
                },
            )
            .await;
        }
        sqlx::query("INSERT INTO error_logs (level, message, created_at) VALUES ('warn', 'old', ?)")
            .bind(Utc::now().naive_utc() - Duration::days(40))
            .execute(&ctx.pool)
            .await
            .unwrap();
    }

    #[actix_web::test]
    async fn list_filter_export_and_clear() {
        let ctx = TestContext::new().await;
        seed(&ctx).await;
        let app = test::init_service(ctx.app()).await;
        let admin = ctx.bearer_for("admin", Role::Admin, None);

        let req = test::TestRequest::get()
            .uri("/api/error-logs?search=disk")
            .insert_header(admin.clone())
            .to_request();
        let page: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["data"][0]["status_code"], 500);

        let req = test::TestRequest::get()
            .uri("/api/error-logs/export?level=error")
            .insert_header(admin.clone())
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(String::from_utf8_lossy(&body).lines().count(), 3);

        let req = test::TestRequest::delete()
            .uri("/api/error-logs?older_than_days=30")
            .insert_header(admin.clone())
            .to_request();
        let cleared: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(cleared["deleted"], 1);

        let req = test::TestRequest::delete()
            .uri("/api/error-logs/9999")
            .insert_header(admin.clone())
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );

        let req = test::TestRequest::get()
            .uri("/api/error-logs")
            .insert_header(ctx.bearer_for("hr", Role::Hr, None))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::FORBIDDEN
        );
    }

    #[actix_web::test]
    async fn clear_rejects_an_out_of_range_age() {
        let ctx = TestContext::new().await;
        seed(&ctx).await;
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::delete()
            .uri("/api/error-logs?older_than_days=4000000000")
            .insert_header(ctx.bearer_for("admin", Role::Admin, None))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );

        let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM error_logs")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
        assert_eq!(left, 3);
    }
}
