use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

#[derive(Debug, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub custom_fields: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Project {
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = "Riverside Tower")]
    pub name: String,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = "date", example = "2026-01-01")]
    pub start_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date", example = "2026-12-31")]
    pub end_date: Option<NaiveDate>,
    #[schema(value_type = Object, example = json!({"client": "ACME", "budget": 120000}))]
    pub custom_fields: Map<String, Value>,
    pub is_active: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: NaiveDateTime,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        // a corrupt column should not make the project unreadable
        let custom_fields = match serde_json::from_str::<Value>(&row.custom_fields) {
            Ok(Value::Object(map)) => map,
            _ => {
                tracing::warn!(project_id = row.id, "custom_fields is not a JSON object");
                Map::new()
            }
        };

        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            start_date: row.start_date,
            end_date: row.end_date,
            custom_fields,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
