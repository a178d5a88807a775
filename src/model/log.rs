use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct ErrorLog {
    pub id: i64,
    #[schema(example = "error")]
    pub level: String,
    pub message: String,
    #[schema(example = "/api/projects")]
    pub path: Option<String>,
    #[schema(example = "POST")]
    pub method: Option<String>,
    #[schema(example = 500)]
    pub status_code: Option<i64>,
    pub details: Option<String>,
    pub username: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct ActivityLog {
    pub id: i64,
    pub username: Option<String>,
    #[schema(example = "clock_in")]
    pub action: String,
    pub details: Option<String>,
    pub ip: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}
