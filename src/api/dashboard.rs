use crate::{
    auth::auth::AuthUser,
    error::AppResult,
    model::{employee::STATUS_ACTIVE, log::ActivityLog},
};
use actix_web::{HttpResponse, web};
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

const RECENT_ACTIVITY: i64 = 10;

#[derive(Serialize, ToSchema)]
pub struct DashboardSummary {
    #[schema(example = 42)]
    pub active_employees: i64,
    #[schema(example = 5)]
    pub active_projects: i64,
    #[schema(example = 37)]
    pub clock_ins_today: i64,
    #[schema(example = 12)]
    pub clock_outs_today: i64,
    #[schema(example = 0)]
    pub errors_last_24h: i64,
    pub recent_activity: Vec<ActivityLog>,
}

/// Dashboard summary
#[utoipa::path(
    get,
    path = "/api/dashboard",
    responses(
        (status = 200, description = "Summary counts", body = DashboardSummary),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn dashboard(auth: AuthUser, pool: web::Data<SqlitePool>) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let pool = pool.get_ref();

    let now = Utc::now().naive_utc();
    let today = now.date().and_hms_opt(0, 0, 0).unwrap_or(now);

    let active_employees: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM employees WHERE status = ?")
        .bind(STATUS_ACTIVE)
        .fetch_one(pool)
        .await?;

    let active_projects: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE is_active = 1")
        .fetch_one(pool)
        .await?;

    let (clock_ins_today, clock_outs_today): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN action = 'clock_in' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN action = 'clock_out' THEN 1 ELSE 0 END), 0)
        FROM attendance
        WHERE timestamp >= ?
        "#,
    )
    .bind(today)
    .fetch_one(pool)
    .await?;

    let errors_last_24h: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM error_logs WHERE created_at >= ?")
        .bind(now - Duration::hours(24))
        .fetch_one(pool)
        .await?;

    let recent_activity = sqlx::query_as::<_, ActivityLog>(
        "SELECT id, username, action, details, ip, created_at FROM activity_logs \
         ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(RECENT_ACTIVITY)
    .fetch_all(pool)
    .await?;

    Ok(HttpResponse::Ok().json(DashboardSummary {
        active_employees,
        active_projects,
        clock_ins_today,
        clock_outs_today,
        errors_last_24h,
        recent_activity,
    }))
}

#[cfg(test)]
mod tests {
    use crate::{model::role::Role, test_support::TestContext};
    use actix_web::test;
    use chrono::Utc;
    use serde_json::Value;

    #[actix_web::test]
    async fn counts_today_and_active_records() {
        let ctx = TestContext::new().await;
        ctx.seed_employee("EMP-1", "active").await;
        ctx.seed_employee("EMP-2", "inactive").await;
        ctx.seed_project("Live", true).await;
        ctx.seed_project("Done", false).await;
        sqlx::query(
            "INSERT INTO attendance (employee_code, action, timestamp) VALUES ('EMP-1', 'clock_in', ?)",
        )
        .bind(Utc::now().naive_utc())
        .execute(&ctx.pool)
        .await
        .unwrap();
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::get()
            .uri("/api/dashboard")
            .insert_header(ctx.bearer_for("hr", Role::Hr, None))
            .to_request();
        let summary: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(summary["active_employees"], 1);
        assert_eq!(summary["active_projects"], 1);
        assert_eq!(summary["clock_ins_today"], 1);
        assert_eq!(summary["clock_outs_today"], 0);
    }
}
