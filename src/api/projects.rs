use crate::{
    auth::auth::AuthUser,
    error::{AppError, AppResult, FieldError},
    model::project::{Project, ProjectRow},
    models::{Page, paging},
    utils::{
        audit::{client_ip, record_activity},
        db_utils::{FilterValue, Filters},
    },
};
use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use sqlx::SqlitePool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

const PROJECT_COLUMNS: &str =
    "id, name, description, start_date, end_date, custom_fields, is_active, created_at, updated_at";

const MAX_CUSTOM_FIELDS: usize = 50;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProject {
    #[schema(example = "Riverside Tower")]
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = "date", example = "2026-01-01")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date", example = "2026-12-31")]
    pub end_date: Option<NaiveDate>,
    /// Flat object; values must be strings, numbers, booleans or null
    #[schema(value_type = Object, example = json!({"client": "ACME", "budget": 120000}))]
    pub custom_fields: Option<Value>,
    pub is_active: Option<bool>,
}

/// Absent fields are left unchanged; `null` clears a nullable field.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProject {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = "date")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = "date")]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<Object>)]
    pub custom_fields: Option<Option<Value>>,
    pub is_active: Option<bool>,
}

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// Checks that custom fields are a flat object of scalar values.
pub fn validate_custom_fields(value: &Value) -> Result<Map<String, Value>, FieldError> {
    let map = value
        .as_object()
        .ok_or_else(|| FieldError::new("custom_fields", "must be a JSON object"))?;

    if map.len() > MAX_CUSTOM_FIELDS {
        return Err(FieldError::new(
            "custom_fields",
            format!("at most {MAX_CUSTOM_FIELDS} entries are allowed"),
        ));
    }

    for (key, v) in map {
        if key.trim().is_empty() {
            return Err(FieldError::new("custom_fields", "keys cannot be empty"));
        }
        if v.is_object() || v.is_array() {
            return Err(FieldError::new(
                "custom_fields",
                format!("'{key}' must be a string, number, boolean or null"),
            ));
        }
    }

    Ok(map.clone())
}

fn check_dates(
    errors: &mut Vec<FieldError>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            errors.push(FieldError::new("end_date", "cannot be before start_date"));
        }
    }
}

async fn fetch_project(pool: &SqlitePool, id: i64) -> AppResult<Project> {
    sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(Project::from)
    .ok_or_else(|| AppError::NotFound("Project not found".into()))
}

/// Create Project
#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProject,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Project name already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn create_project(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    payload: web::Json<CreateProject>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;

    let mut errors = Vec::new();
    let name = payload.name.trim();
    if name.is_empty() {
        errors.push(FieldError::new("name", "is required"));
    }
    check_dates(&mut errors, payload.start_date, payload.end_date);

    let custom_fields = match &payload.custom_fields {
        None | Some(Value::Null) => Map::new(),
        Some(v) => match validate_custom_fields(v) {
            Ok(map) => map,
            Err(e) => {
                errors.push(e);
                Map::new()
            }
        },
    };

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let now = Utc::now().naive_utc();
    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        r#"
        INSERT INTO projects (name, description, start_date, end_date, custom_fields, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {PROJECT_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(payload.description.as_deref().map(str::trim))
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(Value::Object(custom_fields).to_string())
    .bind(payload.is_active.unwrap_or(true))
    .bind(now)
    .bind(now)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| AppError::from_write(e, "Project name already exists"))?;

    info!(project_id = row.id, "Project created");
    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "project_created",
        Some(&format!("project #{} {}", row.id, row.name)),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Created().json(Project::from(row)))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProjectQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Only active (true) or inactive (false) projects
    pub active: Option<bool>,
    /// Matches name or description
    pub search: Option<String>,
}

/// List Projects
#[utoipa::path(
    get,
    path = "/api/projects",
    params(ProjectQuery),
    responses((status = 200, description = "Paginated project list", body = ProjectPage)),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn list_projects(
    _auth: AuthUser,
    pool: web::Data<SqlitePool>,
    query: web::Query<ProjectQuery>,
) -> AppResult<HttpResponse> {
    let (page, per_page, offset) = paging(query.page, query.per_page);

    let mut filters = Filters::new();
    if let Some(active) = query.active {
        filters.push("is_active = ?", [FilterValue::Bool(active)]);
    }
    if let Some(term) = &query.search {
        filters.search(&["name", "description"], term);
    }
    let where_sql = filters.where_sql();

    let count_sql = format!("SELECT COUNT(*) FROM projects{where_sql}");
    let total = filters
        .bind_scalar(sqlx::query_scalar::<_, i64>(&count_sql))
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql =
        format!("SELECT {PROJECT_COLUMNS} FROM projects{where_sql} ORDER BY name ASC LIMIT ? OFFSET ?");
    debug!(sql = %data_sql, page, per_page, "Fetching projects");
    let rows = filters
        .bind_as(sqlx::query_as::<_, ProjectRow>(&data_sql))
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(Page {
        data: rows.into_iter().map(Project::from).collect::<Vec<_>>(),
        page,
        per_page,
        total,
    }))
}

/// Get Project
#[utoipa::path(
    get,
    path = "/api/projects/{project_id}",
    params(("project_id" = i64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project found", body = Project),
        (status = 404, description = "Project not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn get_project(
    _auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let project = fetch_project(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(project))
}

/// Update Project
#[utoipa::path(
    put,
    path = "/api/projects/{project_id}",
    params(("project_id" = i64, Path, description = "Project ID")),
    request_body = UpdateProject,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Project not found"),
        (status = 409, description = "Project name already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn update_project(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
    payload: web::Json<UpdateProject>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();
    let current = fetch_project(pool.get_ref(), id).await?;
    let payload = payload.into_inner();

    let mut errors = Vec::new();

    let name = match payload.name.as_deref().map(str::trim) {
        Some("") => {
            errors.push(FieldError::new("name", "cannot be empty"));
            current.name.clone()
        }
        Some(n) => n.to_string(),
        None => current.name.clone(),
    };
    let description = payload.description.unwrap_or(current.description);
    let start_date = payload.start_date.unwrap_or(current.start_date);
    let end_date = payload.end_date.unwrap_or(current.end_date);
    check_dates(&mut errors, start_date, end_date);

    // custom fields are replaced as a whole
    let custom_fields = match &payload.custom_fields {
        None => current.custom_fields,
        Some(None) => Map::new(),
        Some(Some(v)) => match validate_custom_fields(v) {
            Ok(map) => map,
            Err(e) => {
                errors.push(e);
                Map::new()
            }
        },
    };

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        r#"
        UPDATE projects
        SET name = ?, description = ?, start_date = ?, end_date = ?, custom_fields = ?,
            is_active = ?, updated_at = ?
        WHERE id = ?
        RETURNING {PROJECT_COLUMNS}
        "#
    ))
    .bind(&name)
    .bind(&description)
    .bind(start_date)
    .bind(end_date)
    .bind(Value::Object(custom_fields).to_string())
    .bind(payload.is_active.unwrap_or(current.is_active))
    .bind(Utc::now().naive_utc())
    .bind(id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| AppError::from_write(e, "Project name already exists"))?
    .ok_or_else(|| AppError::NotFound("Project not found".into()))?;

    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "project_updated",
        Some(&format!("project #{id}")),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Ok().json(Project::from(row)))
}

/// Delete Project
#[utoipa::path(
    delete,
    path = "/api/projects/{project_id}",
    params(("project_id" = i64, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Successfully deleted", body = Object, example = json!({
            "message": "Successfully deleted"
        })),
        (status = 404, description = "Project not found"),
        (status = 409, description = "Project has attendance records")
    ),
    security(("bearer_auth" = [])),
    tag = "Project"
)]
pub async fn delete_project(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<SqlitePool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let used: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendance WHERE project_id = ?")
        .bind(id)
        .fetch_one(pool.get_ref())
        .await?;

    if used > 0 {
        return Err(AppError::Conflict(format!(
            "Project is referenced by {used} attendance records; deactivate it instead"
        )));
    }

    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| AppError::from_write(e, "Project is referenced by attendance records"))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Project not found".into()));
    }

    record_activity(
        pool.get_ref(),
        Some(&auth.username),
        "project_deleted",
        Some(&format!("project #{id}")),
        client_ip(&req).as_deref(),
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully deleted" })))
}
