use crate::{
    auth::auth::AuthUser,
    config::Config,
    error::{AppError, AppResult, FieldError},
    model::{
        attendance::{Attendance, ClockAction},
        employee::STATUS_ACTIVE,
    },
    models::{Page, paging},
    utils::{
        audit::{client_ip, record_activity},
        db_utils::{FilterValue, Filters, date_range},
        photo::{ImageKind, decode_photo, remove_photo, resolve_stored, save_photo},
    },
};
use actix_web::{HttpRequest, HttpResponse, http::header, web};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

const MAX_NOTES_LEN: usize = 500;

const ATTENDANCE_COLUMNS: &str = "id, employee_code, project_id, action, timestamp, latitude, \
     longitude, location_address, photo_path, notes, recorded_by";

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ClockRequest {
    /// Defaults to the caller's own employee code when omitted
    #[schema(example = "EMP-001")]
    pub employee_code: Option<String>,
    #[schema(example = "clock_in")]
    pub action: Option<String>,
    #[schema(example = 3)]
    pub project_id: Option<i64>,
    #[schema(example = 23.8103)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125)]
    pub longitude: Option<f64>,
    #[schema(example = "Gulshan Ave, Dhaka")]
    pub location_address: Option<String>,
    /// Base64 JPEG/PNG, optionally as a data URL
    pub photo: Option<String>,
    pub notes: Option<String>,
}

/// A clock request that passed field validation.
#[derive(Debug)]
pub struct ValidClock {
    pub employee_code: String,
    pub action: ClockAction,
    pub project_id: Option<i64>,
    pub location: Option<(f64, f64)>,
    pub location_address: Option<String>,
    pub photo: Option<(Vec<u8>, ImageKind)>,
    pub notes: Option<String>,
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ClockRequest {
    /// Collects every field problem instead of stopping at the first.
    pub fn validate(&self, max_photo_bytes: usize) -> AppResult<ValidClock> {
        let mut errors = Vec::new();

        let employee_code = trimmed(&self.employee_code);
        if employee_code.is_none() {
            errors.push(FieldError::new("employee_code", "is required"));
        }

        let action = match trimmed(&self.action) {
            None => {
                errors.push(FieldError::new("action", "is required"));
                None
            }
            Some(raw) => match ClockAction::from_str(&raw) {
                Ok(action) => Some(action),
                Err(_) => {
                    errors.push(FieldError::new("action", "must be clock_in or clock_out"));
                    None
                }
            },
        };

        let location = match (self.latitude, self.longitude) {
            (None, None) => None,
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    errors.push(FieldError::new("latitude", "must be between -90 and 90"));
                }
                if !(-180.0..=180.0).contains(&lon) {
                    errors.push(FieldError::new("longitude", "must be between -180 and 180"));
                }
                Some((lat, lon))
            }
            (Some(_), None) => {
                errors.push(FieldError::new("longitude", "is required with latitude"));
                None
            }
            (None, Some(_)) => {
                errors.push(FieldError::new("latitude", "is required with longitude"));
                None
            }
        };

        let notes = trimmed(&self.notes);
        if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            errors.push(FieldError::new(
                "notes",
                format!("must be at most {MAX_NOTES_LEN} characters"),
            ));
        }

        let photo = match trimmed(&self.photo) {
            None => None,
            Some(encoded) => match decode_photo(&encoded, max_photo_bytes) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    errors.push(FieldError::new("photo", e.to_string()));
                    None
                }
            },
        };

        match (employee_code, action) {
            (Some(employee_code), Some(action)) if errors.is_empty() => Ok(ValidClock {
                employee_code,
                action,
                project_id: self.project_id,
                location,
                location_address: trimmed(&self.location_address),
                photo,
                notes,
            }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

/// Records one clock event after the employee, project and duplicate checks.
pub async fn record_clock(
    pool: &SqlitePool,
    config: &Config,
    clock: ValidClock,
    recorded_by: Option<&str>,
) -> AppResult<Attendance> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM employees WHERE employee_code = ?")
            .bind(&clock.employee_code)
            .fetch_optional(pool)
            .await?;

    match status.as_deref() {
        None => return Err(AppError::NotFound("Employee not found".into())),
        Some(STATUS_ACTIVE) => {}
        Some(_) => return Err(AppError::BadRequest("Employee is not active".into())),
    }

    if let Some(project_id) = clock.project_id {
        let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(pool)
            .await?;
        match active {
            None => return Err(AppError::NotFound("Project not found".into())),
            Some(false) => return Err(AppError::BadRequest("Project is not active".into())),
            Some(true) => {}
        }
    }

    let now = Utc::now().naive_utc();
    let window_start = now - Duration::minutes(config.duplicate_window_minutes);

    let photo_path = match &clock.photo {
        Some((bytes, kind)) => {
            Some(save_photo(&config.upload_dir, &clock.employee_code, now, bytes, *kind).await?)
        }
        None => None,
    };

    // the duplicate check and the insert are one statement, so two identical
    // requests racing on different connections cannot both land
    let inserted = sqlx::query_as::<_, Attendance>(&format!(
        r#"
        INSERT INTO attendance
            (employee_code, project_id, action, timestamp, latitude, longitude,
             location_address, photo_path, notes, recorded_by)
        SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
        WHERE NOT EXISTS (
            SELECT 1 FROM attendance
            WHERE employee_code = ? AND action = ? AND timestamp >= ?
        )
        RETURNING {ATTENDANCE_COLUMNS}
        "#
    ))
    .bind(&clock.employee_code)
    .bind(clock.project_id)
    .bind(clock.action)
    .bind(now)
    .bind(clock.location.map(|(lat, _)| lat))
    .bind(clock.location.map(|(_, lon)| lon))
    .bind(&clock.location_address)
    .bind(&photo_path)
    .bind(&clock.notes)
    .bind(recorded_by)
    .bind(&clock.employee_code)
    .bind(clock.action)
    .bind(window_start)
    .fetch_optional(pool)
    .await;

    let failure = match inserted {
        Ok(Some(row)) => return Ok(row),
        Ok(None) => {
            info!(
                employee_code = %clock.employee_code,
                action = %clock.action,
                "Duplicate clock event rejected"
            );
            AppError::Conflict(format!(
                "Already recorded {} within the last {} minutes",
                clock.action, config.duplicate_window_minutes
            ))
        }
        Err(e) => {
            error!(error = %e, employee_code = %clock.employee_code, "Clock insert failed");
            e.into()
        }
    };

    if let Some(path) = &photo_path {
        remove_photo(&config.upload_dir, path).await;
    }
    Err(failure)
}

/// Clock in/out
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = ClockRequest,
    responses(
        (status = 201, description = "Recorded", body = Attendance),
        (status = 400, description = "Validation failed", body = Object, example = json!({
            "error": "Validation failed",
            "fields": [{"field": "action", "message": "is required"}]
        })),
        (status = 403, description = "Employees may only clock for themselves"),
        (status = 404, description = "Employee or project not found"),
        (status = 409, description = "Same action recorded within the duplicate window")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn clock(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
    payload: web::Json<ClockRequest>,
) -> AppResult<HttpResponse> {
    let mut payload = payload.into_inner();

    if auth.is_employee() {
        let own = auth
            .employee_code
            .as_deref()
            .ok_or_else(|| AppError::Forbidden("No employee profile".into()))?;
        match trimmed(&payload.employee_code) {
            None => payload.employee_code = Some(own.to_string()),
            Some(code) if code == own => {}
            Some(_) => {
                return Err(AppError::Forbidden(
                    "Employees can only clock for themselves".into(),
                ));
            }
        }
    } else if trimmed(&payload.employee_code).is_none() {
        payload.employee_code = auth.employee_code.clone();
    }

    let clock = payload.validate(config.max_photo_bytes)?;
    let record = record_clock(pool.get_ref(), &config, clock, Some(&auth.username)).await?;

    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        record.action.as_ref(),
        Some(&format!("employee {} attendance #{}", record.employee_code, record.id)),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Created().json(record))
}

/// Public kiosk clock in/out
#[utoipa::path(
    post,
    path = "/kiosk/clock",
    request_body = ClockRequest,
    responses(
        (status = 201, description = "Recorded", body = Attendance),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Employee or project not found"),
        (status = 409, description = "Same action recorded within the duplicate window")
    ),
    tag = "Attendance"
)]
pub async fn kiosk_clock(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
    payload: web::Json<ClockRequest>,
) -> AppResult<HttpResponse> {
    let clock = payload.validate(config.max_photo_bytes)?;
    let record = record_clock(pool.get_ref(), &config, clock, None).await?;

    record_activity(
        pool.get_ref(),
        None,
        record.action.as_ref(),
        Some(&format!("kiosk: employee {} attendance #{}", record.employee_code, record.id)),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Created().json(record))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AttendanceQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub employee_code: Option<String>,
    pub project_id: Option<i64>,
    /// clock_in or clock_out
    pub action: Option<String>,
    /// Inclusive start date (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    /// Inclusive end date (YYYY-MM-DD)
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
}

/// Employees are always narrowed to their own rows.
fn attendance_filters(auth: &AuthUser, query: &AttendanceQuery) -> AppResult<Filters> {
    let mut filters = Filters::new();

    let employee_code = if auth.is_employee() {
        Some(
            auth.employee_code
                .clone()
                .ok_or_else(|| AppError::Forbidden("No employee profile".into()))?,
        )
    } else {
        trimmed(&query.employee_code)
    };

    if let Some(code) = employee_code {
        filters.push("employee_code = ?", [FilterValue::Str(code)]);
    }
    if let Some(project_id) = query.project_id {
        filters.push("project_id = ?", [FilterValue::I64(project_id)]);
    }
    if let Some(raw) = trimmed(&query.action) {
        let action = ClockAction::from_str(&raw)
            .map_err(|_| AppError::BadRequest("action must be clock_in or clock_out".into()))?;
        filters.push("action = ?", [FilterValue::Str(action.to_string())]);
    }
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if from > to {
            return Err(AppError::BadRequest("from cannot be after to".into()));
        }
    }
    date_range(&mut filters, "timestamp", query.from, query.to);

    Ok(filters)
}

/// List attendance records
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated attendance", body = AttendancePage),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<AttendanceQuery>,
) -> AppResult<HttpResponse> {
    let (page, per_page, offset) = paging(query.page, query.per_page);
    let filters = attendance_filters(&auth, &query)?;
    let where_sql = filters.where_sql();

    let count_sql = format!("SELECT COUNT(*) FROM attendance{where_sql}");
    let total = filters
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance{where_sql} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?"
    );
    let data = filters
        .bind_as(sqlx::query_as::<_, Attendance>(&data_sql))
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

#[derive(Serialize, ToSchema)]
pub struct ClockStatus {
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    /// true when the latest event is a clock-in
    pub clocked_in: bool,
    pub last: Option<Attendance>,
    /// The action the client should offer next
    pub next_action: ClockAction,
}

/// Caller's current clock status
#[utoipa::path(
    get,
    path = "/api/attendance/status",
    responses(
        (status = 200, description = "Latest event for the caller", body = ClockStatus),
        (status = 403, description = "No employee profile")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn attendance_status(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
) -> AppResult<HttpResponse> {
    let employee_code = auth
        .employee_code
        .clone()
        .ok_or_else(|| AppError::Forbidden("No employee profile".into()))?;

    let last = sqlx::query_as::<_, Attendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE employee_code = ? \
         ORDER BY timestamp DESC, id DESC LIMIT 1"
    ))
    .bind(&employee_code)
    .fetch_optional(pool.get_ref())
    .await?;

    let clocked_in = last
        .as_ref()
        .is_some_and(|a| a.action == ClockAction::ClockIn);

    Ok(HttpResponse::Ok().json(ClockStatus {
        employee_code,
        clocked_in,
        last,
        next_action: if clocked_in {
            ClockAction::ClockOut
        } else {
            ClockAction::ClockIn
        },
    }))
}

async fn fetch_visible(auth: &AuthUser, pool: &SqlitePool, id: i64) -> AppResult<Attendance> {
    let record = sqlx::query_as::<_, Attendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Attendance record not found".into()))?;

    // other employees' rows look absent rather than forbidden
    if auth.is_employee() && auth.employee_code.as_deref() != Some(record.employee_code.as_str()) {
        return Err(AppError::NotFound("Attendance record not found".into()));
    }
    Ok(record)
}

/// Get attendance record
#[utoipa::path(
    get,
    path = "/api/attendance/{attendance_id}",
    params(("attendance_id" = i64, Path, description = "Attendance ID")),
    responses(
        (status = 200, description = "Found", body = Attendance),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn get_attendance(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let record = fetch_visible(&auth, pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Attendance photo
#[utoipa::path(
    get,
    path = "/api/attendance/{attendance_id}/photo",
    params(("attendance_id" = i64, Path, description = "Attendance ID")),
    responses(
        (status = 200, description = "JPEG or PNG bytes"),
        (status = 404, description = "No record or no photo")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn attendance_photo(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let record = fetch_visible(&auth, pool.get_ref(), path.into_inner()).await?;

    let file = record
        .photo_path
        .as_deref()
        .and_then(|p| resolve_stored(&config.upload_dir, p))
        .ok_or_else(|| AppError::NotFound("No photo for this record".into()))?;

    let bytes = match tokio::fs::read(&file).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("Photo file is missing".into()));
        }
        Err(e) => return Err(e.into()),
    };

    let content_type = ImageKind::sniff(&bytes)
        .map(|k| k.content_type())
        .unwrap_or("application/octet-stream");

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, content_type))
        .body(bytes))
}

/// Delete attendance record (admin)
#[utoipa::path(
    delete,
    path = "/api/attendance/{attendance_id}",
    params(("attendance_id" = i64, Path, description = "Attendance ID")),
    responses(
        (status = 200, description = "Deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn delete_attendance(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let photo: Option<Option<String>> =
        sqlx::query_scalar("DELETE FROM attendance WHERE id = ? RETURNING photo_path")
            .bind(id)
            .fetch_optional(pool.get_ref())
            .await?;

    let Some(photo) = photo else {
        return Err(AppError::NotFound("Attendance record not found".into()));
    };
    if let Some(path) = photo {
        remove_photo(&config.upload_dir, &path).await;
    }

    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "attendance_deleted",
        Some(&format!("attendance #{id}")),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}

/// Export attendance as CSV (HR/Admin)
#[utoipa::path(
    get,
    path = "/api/attendance/export",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv"),
        (status = 403, description = "HR/Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn export_attendance(
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<AttendanceQuery>,
) -> AppResult<HttpResponse> {
    auth.require_hr_or_admin()?;

    let filters = attendance_filters(&auth, &query)?;
    let sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance{} ORDER BY timestamp ASC, id ASC",
        filters.where_sql()
    );
    let rows = filters
        .bind_as(sqlx::query_as::<_, Attendance>(&sql))
        .fetch_all(pool.get_ref())
        .await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "id",
            "employee_code",
            "project_id",
            "action",
            "timestamp",
            "latitude",
            "longitude",
            "location_address",
            "photo_path",
            "notes",
            "recorded_by",
        ])
        .map_err(|e| AppError::Internal(e.to_string()))?;

    for row in &rows {
        writer
            .write_record([
                row.id.to_string(),
                row.employee_code.clone(),
                row.project_id.map(|p| p.to_string()).unwrap_or_default(),
                row.action.to_string(),
                row.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                row.latitude.map(|v| v.to_string()).unwrap_or_default(),
                row.longitude.map(|v| v.to_string()).unwrap_or_default(),
                row.location_address.clone().unwrap_or_default(),
                row.photo_path.clone().unwrap_or_default(),
                row.notes.clone().unwrap_or_default(),
                row.recorded_by.clone().unwrap_or_default(),
            ])
            .map_err(|e| AppError::Internal(e.to_string()))?;
    }

    let body = writer
        .into_inner()
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(csv_response("attendance.csv", body))
}

pub fn csv_response(filename: &str, body: Vec<u8>) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/csv; charset=utf-8"))
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ))
        .body(body)
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    fn valid_request() -> ClockRequest {
        ClockRequest {
            employee_code: Some("EMP-1".into()),
            action: Some("clock_in".into()),
            ..Default::default()
        }
    }

    #[test]
    fn validation_reports_all_missing_fields() {
        let err = ClockRequest::default().validate(1024).unwrap_err();
        match err {
            AppError::Validation(fields) => {
                let names: Vec<_> = fields.iter().map(|f| f.field).collect();
                assert_eq!(names, vec!["employee_code", "action"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validation_checks_coordinates_and_action() {
        let req = ClockRequest {
            action: Some("lunch".into()),
            latitude: Some(95.0),
            longitude: Some(10.0),
            ..valid_request()
        };
        let AppError::Validation(fields) = req.validate(1024).unwrap_err() else {
            panic!("expected validation error");
        };
        let names: Vec<_> = fields.iter().map(|f| f.field).collect();
        assert_eq!(names, vec!["action", "latitude"]);

        let req = ClockRequest {
            latitude: Some(10.0),
            ..valid_request()
        };
        assert!(req.validate(1024).is_err());

        let ok = valid_request().validate(1024).unwrap();
        assert_eq!(ok.action, ClockAction::ClockIn);
        assert_eq!(ok.employee_code, "EMP-1");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::role::Role, test_support::TestContext};
    use actix_web::{http::StatusCode, test};
    use serde_json::Value;

    #[actix_web::test]
    async fn missing_required_fields_are_rejected() {
        let ctx = TestContext::new().await;
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::post()
            .uri("/kiosk/clock")
            .set_json(json!({"employee_code": ""}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["fields"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn duplicate_clock_in_within_window_is_rejected() {
        let ctx = TestContext::new().await;
        ctx.seed_employee("EMP-1", "active").await;
        let app = test::init_service(ctx.app()).await;

        let clock_in = || {
            test::TestRequest::post()
                .uri("/kiosk/clock")
                .set_json(json!({"employee_code": "EMP-1", "action": "clock_in"}))
                .to_request()
        };

        let resp = test::call_service(&app, clock_in()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = test::call_service(&app, clock_in()).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // a different action is not a duplicate
        let req = test::TestRequest::post()
            .uri("/kiosk/clock")
            .set_json(json!({"employee_code": "EMP-1", "action": "clock_out"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::CREATED
        );
    }

    #[actix_web::test]
    async fn clock_in_outside_window_is_accepted() {
        let ctx = TestContext::new().await;
        ctx.seed_employee("EMP-2", "active").await;
        sqlx::query(
            "INSERT INTO attendance (employee_code, action, timestamp) VALUES ('EMP-2', 'clock_in', ?)",
        )
        .bind(Utc::now().naive_utc() - Duration::minutes(16))
        .execute(&ctx.pool)
        .await
        .unwrap();
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::post()
            .uri("/kiosk/clock")
            .set_json(json!({"employee_code": "EMP-2", "action": "clock_in"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::CREATED
        );
    }

    #[actix_web::test]
    async fn unknown_or_inactive_employee_cannot_clock() {
        let ctx = TestContext::new().await;
        ctx.seed_employee("GONE", "inactive").await;
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::post()
            .uri("/kiosk/clock")
            .set_json(json!({"employee_code": "NOBODY", "action": "clock_in"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );

        let req = test::TestRequest::post()
            .uri("/kiosk/clock")
            .set_json(json!({"employee_code": "GONE", "action": "clock_in"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[actix_web::test]
    async fn employees_clock_only_for_themselves() {
        let ctx = TestContext::new().await;
        ctx.seed_employee("EMP-1", "active").await;
        ctx.seed_employee("EMP-2", "active").await;
        let app = test::init_service(ctx.app()).await;
        let auth = ctx.bearer_for("alice", Role::Employee, Some("EMP-1"));

        let req = test::TestRequest::post()
            .uri("/api/attendance")
            .insert_header(auth.clone())
            .set_json(json!({"employee_code": "EMP-2", "action": "clock_in"}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::FORBIDDEN
        );

        // employee_code defaults to the caller's own
        let req = test::TestRequest::post()
            .uri("/api/attendance")
            .insert_header(auth.clone())
            .set_json(json!({
                "action": "clock_in",
                "latitude": 23.81,
                "longitude": 90.41,
                "photo": crate::utils::photo::tiny_png_base64()
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["employee_code"], "EMP-1");
        assert_eq!(body["recorded_by"], "alice");
        let photo = body["photo_path"].as_str().unwrap();
        assert!(ctx.upload_dir().join(photo).exists());

        let req = test::TestRequest::get()
            .uri("/api/attendance/status")
            .insert_header(auth.clone())
            .to_request();
        let status: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status["clocked_in"], true);
        assert_eq!(status["next_action"], "clock_out");

        let id = body["id"].as_i64().unwrap();
        let req = test::TestRequest::get()
            .uri(&format!("/api/attendance/{id}/photo"))
            .insert_header(auth)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );
    }

    #[actix_web::test]
    async fn inactive_project_is_refused() {
        let ctx = TestContext::new().await;
        ctx.seed_employee("EMP-1", "active").await;
        let project_id = ctx.seed_project("Old Site", false).await;
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::post()
            .uri("/kiosk/clock")
            .set_json(json!({"employee_code": "EMP-1", "action": "clock_in", "project_id": project_id}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );

        let req = test::TestRequest::post()
            .uri("/kiosk/clock")
            .set_json(json!({"employee_code": "EMP-1", "action": "clock_in", "project_id": 999}))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn list_is_scoped_for_employees_and_export_is_staff_only() {
        let ctx = TestContext::new().await;
        for (code, ts) in [("EMP-1", 60), ("EMP-2", 50), ("EMP-1", 40)] {
            sqlx::query(
                "INSERT INTO attendance (employee_code, action, timestamp) VALUES (?, 'clock_in', ?)",
            )
            .bind(code)
            .bind(Utc::now().naive_utc() - Duration::minutes(ts))
            .execute(&ctx.pool)
            .await
            .unwrap();
        }
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::get()
            .uri("/api/attendance?employee_code=EMP-2")
            .insert_header(ctx.bearer_for("alice", Role::Employee, Some("EMP-1")))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 2);

        let req = test::TestRequest::get()
            .uri("/api/attendance?employee_code=EMP-2")
            .insert_header(ctx.bearer_for("hr", Role::Hr, None))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total"], 1);

        let req = test::TestRequest::get()
            .uri("/api/attendance/export")
            .insert_header(ctx.bearer_for("alice", Role::Employee, Some("EMP-1")))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::FORBIDDEN
        );

        let req = test::TestRequest::get()
            .uri("/api/attendance/export")
            .insert_header(ctx.bearer_for("hr", Role::Hr, None))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.starts_with("id,employee_code"));
    }

    async fn clock_in_for(
        pool: &SqlitePool,
        config: &Config,
        employee_code: &str,
    ) -> AppResult<Attendance> {
        let clock = ClockRequest {
            employee_code: Some(employee_code.into()),
            action: Some("clock_in".into()),
            ..Default::default()
        }
        .validate(1024)?;
        record_clock(pool, config, clock, None).await
    }

    #[actix_web::test]
    async fn concurrent_duplicates_are_recorded_once() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("clock.db").display());
        let pool = crate::db::init_db(&url).await.unwrap();
        let config = Config::for_tests(dir.path().to_path_buf());
        sqlx::query(
            "INSERT INTO employees (employee_code, full_name, status) VALUES ('EMP-R', 'Rafi', 'active')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let results =
            futures::future::join_all((0..4).map(|_| clock_in_for(&pool, &config, "EMP-R"))).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, AppError::Conflict(_)))
        );

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }
}
