use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    sqlx::Type,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[sqlx(rename_all = "snake_case")]
pub enum ClockAction {
    ClockIn,
    ClockOut,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Attendance {
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = "EMP-001")]
    pub employee_code: String,
    #[schema(example = 3, nullable = true)]
    pub project_id: Option<i64>,
    pub action: ClockAction,
    #[schema(value_type = String, format = "date-time", example = "2026-01-01T08:00:00")]
    pub timestamp: NaiveDateTime,
    #[schema(example = 23.8103, nullable = true)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125, nullable = true)]
    pub longitude: Option<f64>,
    pub location_address: Option<String>,
    #[schema(example = "photos/EMP-001_20260101080000_ab12.jpg", nullable = true)]
    pub photo_path: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
}
