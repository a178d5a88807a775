use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult, FieldError},
    model::employee::{Employee, STATUS_ACTIVE, STATUS_INACTIVE},
    models::{Page, paging},
    utils::{
        audit::{client_ip, record_activity},
        db_utils::{Column, FilterValue, Filters, build_update_sql, execute_update},
    },
};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

const EMPLOYEE_COLUMNS: &str = "id, employee_code, full_name, department, position, email, phone, \
     hire_date, status, created_at, updated_at";

/// Columns a client may change through `PUT /employees/{id}`.
const UPDATABLE: &[Column] = &[
    Column::text("full_name"),
    Column::text("department"),
    Column::text("position"),
    Column::text("email"),
    Column::text("phone"),
    Column::date("hire_date"),
    Column::text("status"),
];

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    #[schema(example = "John Doe")]
    pub full_name: String,
    #[schema(example = "Engineering")]
    pub department: Option<String>,
    #[schema(example = "Site Supervisor")]
    pub position: Option<String>,
    #[schema(example = "john@email.com", format = "email")]
    pub email: Option<String>,
    #[schema(example = "+8801712345678")]
    pub phone: Option<String>,
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub hire_date: Option<NaiveDate>,
    #[schema(example = "active")]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub department: Option<String>,
    pub status: Option<String>,
    /// Search by code, name or email
    pub search: Option<String>,
}

/// Documents the partial update body; the handler takes raw JSON.
#[allow(dead_code)]
#[derive(Deserialize, ToSchema)]
pub struct UpdateEmployee {
    pub full_name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub hire_date: Option<NaiveDate>,
    #[schema(example = "inactive")]
    pub status: Option<String>,
}

fn valid_status(status: &str) -> bool {
    status == STATUS_ACTIVE || status == STATUS_INACTIVE
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Create Employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created successfully", body = Employee),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Employee code already exists")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_employee(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    payload: web::Json<CreateEmployee>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let mut errors = Vec::new();
    let code = payload.employee_code.trim();
    if code.is_empty() {
        errors.push(FieldError::new("employee_code", "is required"));
    }
    let full_name = payload.full_name.trim();
    if full_name.is_empty() {
        errors.push(FieldError::new("full_name", "is required"));
    }
    let status = non_blank(&payload.status).unwrap_or(STATUS_ACTIVE);
    if !valid_status(status) {
        errors.push(FieldError::new("status", "must be active or inactive"));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let now = Utc::now().naive_utc();
    let employee = sqlx::query_as::<_, Employee>(&format!(
        r#"
        INSERT INTO employees
        (employee_code, full_name, department, position, email, phone, hire_date, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {EMPLOYEE_COLUMNS}
        "#
    ))
    .bind(code)
    .bind(full_name)
    .bind(non_blank(&payload.department))
    .bind(non_blank(&payload.position))
    .bind(non_blank(&payload.email))
    .bind(non_blank(&payload.phone))
    .bind(payload.hire_date)
    .bind(status)
    .bind(now)
    .bind(now)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to create employee");
        AppError::from_write(e, "Employee code already exists")
    })?;

    info!(employee_id = employee.id, "Employee created");
    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "employee_created",
        Some(&employee.employee_code),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Created().json(employee))
}

/// List Employees
#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeePage)
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_employees(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<EmployeeQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let (page, per_page, offset) = paging(query.page, query.per_page);

    let mut filters = Filters::new();
    if let Some(department) = non_blank(&query.department) {
        filters.push("department = ?", [FilterValue::Str(department.to_string())]);
    }
    if let Some(status) = non_blank(&query.status) {
        filters.push("status = ?", [FilterValue::Str(status.to_string())]);
    }
    if let Some(search) = &query.search {
        filters.search(&["employee_code", "full_name", "email"], search);
    }
    let where_sql = filters.where_sql();

    let count_sql = format!("SELECT COUNT(*) FROM employees{where_sql}");
    debug!(sql = %count_sql, "Counting employees");
    let total = filters
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees{where_sql} ORDER BY employee_code ASC LIMIT ? OFFSET ?"
    );
    debug!(sql = %data_sql, page, per_page, offset, "Fetching employees");
    let employees = filters
        .bind_as(sqlx::query_as::<_, Employee>(&data_sql))
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Page {
        data: employees,
        page,
        per_page,
        total,
    }))
}

/// Update Employee
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(
        ("employee_id" = i64, Path, description = "Employee ID")
    ),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated successfully", body = Employee),
        (status = 400, description = "Unknown field or invalid value"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_employee(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
    body: web::Json<Value>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;
    let employee_id = path.into_inner();

    if let Some(status) = body.get("status") {
        if !status.as_str().is_some_and(valid_status) {
            return Err(AppError::Validation(vec![FieldError::new(
                "status",
                "must be active or inactive",
            )]));
        }
    }
    if let Some(name) = body.get("full_name") {
        if !name.as_str().is_some_and(|n| !n.trim().is_empty()) {
            return Err(AppError::Validation(vec![FieldError::new(
                "full_name",
                "cannot be empty",
            )]));
        }
    }

    let update = build_update_sql("employees", &body, UPDATABLE, "id", employee_id)?;
    let affected = execute_update(pool.get_ref(), update).await?;

    if affected == 0 {
        return Err(AppError::NotFound("Employee not found".into()));
    }

    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "employee_updated",
        Some(&format!("employee #{employee_id}")),
        client_ip(&req).as_deref(),
    )
    .await;

    let employee = fetch_employee(pool.get_ref(), employee_id).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/// Delete Employee
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}",
    params(
        ("employee_id" = i64, Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Employee has attendance records")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_employee(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let employee_id = path.into_inner();
    let employee = fetch_employee(pool.get_ref(), employee_id).await?;

    let records: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM attendance WHERE employee_code = ?")
            .bind(&employee.employee_code)
            .fetch_one(pool.get_ref())
            .await?;
    if records > 0 {
        return Err(AppError::Conflict(
            "Employee has attendance records; set status to inactive instead".into(),
        ));
    }

    let res = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Employee not found".into()));
    }

    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "employee_deleted",
        Some(&employee.employee_code),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "message": "Successfully deleted"
    })))
}

async fn fetch_employee(pool: &SqlitePool, employee_id: i64) -> AppResult<Employee> {
    sqlx::query_as::<_, Employee>(&format!(
        "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = ?"
    ))
    .bind(employee_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        error!(error = %e, employee_id, "Failed to fetch employee");
        AppError::Database(e)
    })?
    .ok_or_else(|| AppError::NotFound("Employee not found".into()))
}

/// Get Employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(
        ("employee_id" = i64, Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_employee(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let employee = fetch_employee(pool.get_ref(), path.into_inner()).await?;

    // employees may read their own record only
    if auth.is_employee() && auth.employee_code.as_deref() != Some(employee.employee_code.as_str())
    {
        return Err(AppError::Forbidden("HR/Admin only".into()));
    }

    Ok(HttpResponse::Ok().json(employee))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::role::Role, test_support::TestContext};
    use actix_web::{http::StatusCode, test};

    #[actix_web::test]
    async fn create_list_and_update() {
        let ctx = TestContext::new().await;
        let app = test::init_service(ctx.app()).await;
        let hr = ctx.bearer_for("hr", Role::Hr, None);

        let req = test::TestRequest::post()
            .uri("/api/employees")
            .insert_header(hr.clone())
            .set_json(json!({
                "employee_code": "EMP-9",
                "full_name": "Nadia Rahman",
                "department": "Civil",
                "hire_date": "2025-03-01"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        assert_eq!(created["status"], "active");
        let id = created["id"].as_i64().unwrap();

        let req = test::TestRequest::post()
            .uri("/api/employees")
            .insert_header(hr.clone())
            .set_json(json!({"employee_code": "EMP-9", "full_name": "Someone"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::CONFLICT
        );

        let req = test::TestRequest::get()
            .uri("/api/employees?search=nadia")
            .insert_header(hr.clone())
            .to_request();
        let page: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(page["total"], 1);

        let req = test::TestRequest::put()
            .uri(&format!("/api/employees/{id}"))
            .insert_header(hr.clone())
            .set_json(json!({"status": "inactive", "position": "Foreman"}))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["status"], "inactive");
        assert_eq!(updated["position"], "Foreman");

        let req = test::TestRequest::put()
            .uri(&format!("/api/employees/{id}"))
            .insert_header(hr.clone())
            .set_json(json!({"employee_code": "HACK"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );

        let req = test::TestRequest::put()
            .uri(&format!("/api/employees/{id}"))
            .insert_header(hr)
            .set_json(json!({"status": "fired"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[actix_web::test]
    async fn malformed_hire_date_is_rejected_before_writing() {
        let ctx = TestContext::new().await;
        let id = ctx.seed_employee("EMP-3", "active").await;
        let app = test::init_service(ctx.app()).await;
        let hr = ctx.bearer_for("hr", Role::Hr, None);

        for body in [
            json!({"hire_date": "next monday"}),
            json!({"hire_date": 20250301}),
            json!({"hire_date": "2025-03-01T08:00:00"}),
            json!({"email": 12}),
        ] {
            let req = test::TestRequest::put()
                .uri(&format!("/api/employees/{id}"))
                .insert_header(hr.clone())
                .set_json(body)
                .to_request();
            assert_eq!(
                test::call_service(&app, req).await.status(),
                StatusCode::BAD_REQUEST
            );
        }

        let req = test::TestRequest::get()
            .uri("/api/employees")
            .insert_header(hr.clone())
            .to_request();
        let page: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(page["total"], 1);
        assert!(page["data"][0]["hire_date"].is_null());

        let req = test::TestRequest::put()
            .uri(&format!("/api/employees/{id}"))
            .insert_header(hr)
            .set_json(json!({"hire_date": "2025-03-01"}))
            .to_request();
        let updated: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(updated["hire_date"], "2025-03-01");
    }

    #[actix_web::test]
    async fn employee_reads_only_own_record() {
        let ctx = TestContext::new().await;
        let own = ctx.seed_employee("EMP-1", "active").await;
        let other = ctx.seed_employee("EMP-2", "active").await;
        let app = test::init_service(ctx.app()).await;
        let me = ctx.bearer_for("alice", Role::Employee, Some("EMP-1"));

        let req = test::TestRequest::get()
            .uri(&format!("/api/employees/{own}"))
            .insert_header(me.clone())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri(&format!("/api/employees/{other}"))
            .insert_header(me.clone())
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::FORBIDDEN
        );

        let req = test::TestRequest::get()
            .uri("/api/employees")
            .insert_header(me)
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::FORBIDDEN
        );
    }

    #[actix_web::test]
    async fn employee_with_attendance_cannot_be_deleted() {
        let ctx = TestContext::new().await;
        let id = ctx.seed_employee("EMP-1", "active").await;
        let free = ctx.seed_employee("EMP-2", "active").await;
        sqlx::query(
            "INSERT INTO attendance (employee_code, action, timestamp) VALUES ('EMP-1', 'clock_in', ?)",
        )
        .bind(Utc::now().naive_utc())
        .execute(&ctx.pool)
        .await
        .unwrap();
        let app = test::init_service(ctx.app()).await;
        let admin = ctx.bearer_for("admin", Role::Admin, None);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/employees/{id}"))
            .insert_header(admin.clone())
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::CONFLICT
        );

        let req = test::TestRequest::delete()
            .uri(&format!("/api/employees/{free}"))
            .insert_header(admin)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
