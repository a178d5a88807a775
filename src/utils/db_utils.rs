use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use sqlx::query::{QueryAs, QueryScalar};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Sqlite, SqlitePool};

use crate::error::{AppError, FieldError};

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

/// Storage type of a client-writable column. Both kinds accept `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    /// `YYYY-MM-DD`
    Date,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn text(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Text }
    }

    pub const fn date(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Date }
    }

    fn convert(&self, value: &Value) -> Result<SqlValue, FieldError> {
        match (self.kind, value) {
            (_, Value::Null) => Ok(SqlValue::Null),
            (ColumnKind::Text, Value::String(s)) => Ok(SqlValue::String(s.clone())),
            (ColumnKind::Text, _) => Err(FieldError::new(self.name, "must be a string")),
            (ColumnKind::Date, Value::String(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(SqlValue::Date)
                .map_err(|_| FieldError::new(self.name, "must be a date (YYYY-MM-DD)")),
            (ColumnKind::Date, _) => Err(FieldError::new(self.name, "must be a date (YYYY-MM-DD)")),
        }
    }
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Builds `UPDATE <table> SET ... WHERE <id_column> = ?` from a JSON object.
/// Only columns in `allowed` may be written, and each value must fit the
/// column's kind; the table and column names never come from the client.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[Column],
    id_column: &str,
    id_value: i64,
) -> Result<SqlUpdate, AppError> {
    let obj = payload
        .as_object()
        .ok_or_else(|| AppError::BadRequest("Payload must be a JSON object".into()))?;

    if obj.is_empty() {
        return Err(AppError::BadRequest("No fields provided for update".into()));
    }

    let mut names = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 2);
    let mut errors = Vec::new();

    for (key, value) in obj {
        let column = allowed
            .iter()
            .find(|c| c.name == key.as_str())
            .ok_or_else(|| AppError::BadRequest(format!("Field '{key}' cannot be updated")))?;

        match column.convert(value) {
            Ok(v) => values.push(v),
            Err(e) => errors.push(e),
        }
        names.push(column.name);
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    // Build SET clause
    let set_clause = names
        .iter()
        .map(|name| format!("{name} = ?"))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "UPDATE {} SET {}, updated_at = ? WHERE {} = ?",
        table, set_clause, id_column
    );

    values.push(SqlValue::DateTime(chrono::Utc::now().naive_utc()));
    // WHERE id = ?
    values.push(SqlValue::I64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(pool: &SqlitePool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::DateTime(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

// Helper enum for typed SQLx binding of list filters
#[derive(Debug, Clone)]
pub enum FilterValue {
    I64(i64),
    Str(String),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// `WHERE` clause accumulated from optional query parameters.
#[derive(Debug, Default)]
pub struct Filters {
    clauses: Vec<String>,
    values: Vec<FilterValue>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// `clause` holds one `?` per value, in order.
    pub fn push(&mut self, clause: &str, values: impl IntoIterator<Item = FilterValue>) {
        self.clauses.push(clause.to_string());
        self.values.extend(values);
    }

    /// `(a LIKE ? OR b LIKE ? ...)` over the given columns.
    pub fn search(&mut self, columns: &[&str], term: &str) {
        let term = term.trim();
        if term.is_empty() {
            return;
        }
        let clause = columns
            .iter()
            .map(|c| format!("{c} LIKE ?"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let like = format!("%{term}%");
        self.push(
            &format!("({clause})"),
            columns.iter().map(|_| FilterValue::Str(like.clone())),
        );
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn bind_as<'q, O>(
        &self,
        mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
        for value in &self.values {
            query = match value.clone() {
                FilterValue::I64(v) => query.bind(v),
                FilterValue::Str(v) => query.bind(v),
                FilterValue::Bool(v) => query.bind(v),
                FilterValue::Date(v) => query.bind(v),
                FilterValue::DateTime(v) => query.bind(v),
            };
        }
        query
    }

    pub fn bind_scalar<'q, O>(
        &self,
        mut query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryScalar<'q, Sqlite, O, SqliteArguments<'q>> {
        for value in &self.values {
            query = match value.clone() {
                FilterValue::I64(v) => query.bind(v),
                FilterValue::Str(v) => query.bind(v),
                FilterValue::Bool(v) => query.bind(v),
                FilterValue::Date(v) => query.bind(v),
                FilterValue::DateTime(v) => query.bind(v),
            };
        }
        query
    }
}

/// Inclusive `from`/`to` dates as a half-open timestamp range.
pub fn date_range(
    filters: &mut Filters,
    column: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) {
    if let Some(from) = from.and_then(|d| d.and_hms_opt(0, 0, 0)) {
        filters.push(&format!("{column} >= ?"), [FilterValue::DateTime(from)]);
    }
    if let Some(end) = to
        .and_then(|d| d.succ_opt())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        filters.push(&format!("{column} < ?"), [FilterValue::DateTime(end)]);
    }
}

/// Inclusive range over a plain `YYYY-MM-DD` column.
pub fn day_range(
    filters: &mut Filters,
    column: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) {
    if let Some(from) = from {
        filters.push(&format!("{column} >= ?"), [FilterValue::Date(from)]);
    }
    if let Some(to) = to {
        filters.push(&format!("{column} <= ?"), [FilterValue::Date(to)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[Column] = &[
        Column::text("full_name"),
        Column::date("hire_date"),
        Column::text("status"),
    ];

    #[test]
    fn builds_set_clause_with_typed_values() {
        let update = build_update_sql(
            "employees",
            &json!({"full_name": "Jane", "hire_date": "2024-02-01"}),
            COLUMNS,
            "id",
            9,
        )
        .unwrap();

        assert_eq!(
            update.sql,
            "UPDATE employees SET full_name = ?, hire_date = ?, updated_at = ? WHERE id = ?"
        );
        assert_eq!(update.values[0], SqlValue::String("Jane".into()));
        assert_eq!(
            update.values[1],
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        );
        assert_eq!(update.values.last(), Some(&SqlValue::I64(9)));
    }

    #[test]
    fn values_must_fit_the_column_kind() {
        let err = build_update_sql(
            "employees",
            &json!({"hire_date": "next monday", "full_name": 42}),
            COLUMNS,
            "id",
            1,
        )
        .unwrap_err();
        match err {
            AppError::Validation(fields) => {
                let mut names: Vec<_> = fields.iter().map(|f| f.field).collect();
                names.sort();
                assert_eq!(names, ["full_name", "hire_date"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let cleared =
            build_update_sql("employees", &json!({"hire_date": null}), COLUMNS, "id", 1).unwrap();
        assert_eq!(cleared.values[0], SqlValue::Null);
    }

    #[test]
    fn rejects_columns_outside_the_allow_list() {
        let err = build_update_sql("employees", &json!({"id; DROP": 1}), COLUMNS, "id", 1)
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn filters_render_where_clause() {
        let mut filters = Filters::new();
        assert_eq!(filters.where_sql(), "");

        filters.push("status = ?", [FilterValue::Str("active".into())]);
        filters.search(&["full_name", "email"], "ali");
        filters.search(&["full_name"], "   ");
        assert_eq!(
            filters.where_sql(),
            " WHERE status = ? AND (full_name LIKE ? OR email LIKE ?)"
        );
        assert_eq!(filters.values.len(), 3);
    }

    #[test]
    fn rejects_empty_and_non_object_payloads() {
        assert!(build_update_sql("employees", &json!({}), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("employees", &json!([1]), COLUMNS, "id", 1).is_err());
        assert!(
            build_update_sql("employees", &json!({"status": {"a": 1}}), COLUMNS, "id", 1).is_err()
        );
    }
}
