use chrono::Utc;
use sqlx::SqliteConnection;

use crate::error::AppResult;
use crate::model::employee::{STATUS_ACTIVE, STATUS_INACTIVE};

use super::columns::{ColumnMap, FieldSpec};
use super::values::{non_empty, parse_date};
use super::{IDENTIFIER, ImportReport, RowOutcome};

const FULL_NAME: usize = 1;
const FIRST_NAME: usize = 2;
const LAST_NAME: usize = 3;
const DEPARTMENT: usize = 4;
const POSITION: usize = 5;
const EMAIL: usize = 6;
const PHONE: usize = 7;
const HIRE_DATE: usize = 8;
const STATUS: usize = 9;

pub const FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "employee_code",
        aliases: &[
            "employee code",
            "employee id",
            "employee no",
            "employee number",
            "emp code",
            "emp id",
            "emp no",
            "staff id",
            "staff no",
            "id no",
            "code",
            "id",
        ],
    },
    FieldSpec {
        name: "full_name",
        aliases: &["full name", "employee name", "emp name", "staff name", "name"],
    },
    FieldSpec {
        name: "first_name",
        aliases: &["first name", "given name"],
    },
    FieldSpec {
        name: "last_name",
        aliases: &["last name", "surname", "family name"],
    },
    FieldSpec {
        name: "department",
        aliases: &["department", "dept", "division", "section"],
    },
    FieldSpec {
        name: "position",
        aliases: &["position", "designation", "job title", "title", "role"],
    },
    FieldSpec {
        name: "email",
        aliases: &["email", "e mail", "email address", "mail"],
    },
    FieldSpec {
        name: "phone",
        aliases: &["phone", "phone number", "mobile", "mobile no", "contact no", "contact", "cell"],
    },
    FieldSpec {
        name: "hire_date",
        aliases: &["hire date", "joining date", "date of joining", "join date", "doj", "start date"],
    },
    FieldSpec {
        name: "status",
        aliases: &["status", "employment status", "active"],
    },
];

fn normalize_status(raw: &str) -> Option<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "active" | "yes" | "y" | "1" | "true" | "working" => Some(STATUS_ACTIVE),
        "inactive" | "no" | "n" | "0" | "false" | "left" | "resigned" | "terminated" => {
            Some(STATUS_INACTIVE)
        }
        _ => None,
    }
}

/// `full name`, or `first name` + `last name` when the sheet splits it.
fn full_name(map: &ColumnMap, row: &[String]) -> Option<String> {
    if let Some(name) = non_empty(map.value(row, FULL_NAME)) {
        return Some(name);
    }
    let joined = [map.value(row, FIRST_NAME), map.value(row, LAST_NAME)]
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    non_empty(&joined)
}

pub(crate) async fn import_row(
    conn: &mut SqliteConnection,
    map: &ColumnMap,
    row: &[String],
    line: usize,
    report: &mut ImportReport,
) -> AppResult<RowOutcome> {
    let code = map.value(row, IDENTIFIER).to_string();

    let Some(name) = full_name(map, row) else {
        return Ok(RowOutcome::Rejected(format!("employee {code}: missing name")));
    };

    let hire_date = match map.value(row, HIRE_DATE) {
        "" => None,
        raw => {
            let parsed = parse_date(raw);
            if parsed.is_none() {
                report.warn(line, format!("unrecognised hire date '{raw}'"));
            }
            parsed
        }
    };

    let status = match map.value(row, STATUS) {
        "" => None,
        raw => {
            let parsed = normalize_status(raw);
            if parsed.is_none() {
                report.warn(line, format!("unrecognised status '{raw}'"));
            }
            parsed
        }
    };

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM employees WHERE employee_code = ?)")
            .bind(&code)
            .fetch_one(&mut *conn)
            .await?;

    // empty cells never blank out what is already stored
    sqlx::query(
        r#"
        INSERT INTO employees
            (employee_code, full_name, department, position, email, phone, hire_date, status, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, COALESCE(?, 'active'), ?)
        ON CONFLICT(employee_code) DO UPDATE SET
            full_name = excluded.full_name,
            department = COALESCE(?, employees.department),
            position = COALESCE(?, employees.position),
            email = COALESCE(?, employees.email),
            phone = COALESCE(?, employees.phone),
            hire_date = COALESCE(?, employees.hire_date),
            status = COALESCE(?, employees.status),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&code)
    .bind(&name)
    .bind(non_empty(map.value(row, DEPARTMENT)))
    .bind(non_empty(map.value(row, POSITION)))
    .bind(non_empty(map.value(row, EMAIL)))
    .bind(non_empty(map.value(row, PHONE)))
    .bind(hire_date)
    .bind(status)
    .bind(Utc::now().naive_utc())
    .bind(non_empty(map.value(row, DEPARTMENT)))
    .bind(non_empty(map.value(row, POSITION)))
    .bind(non_empty(map.value(row, EMAIL)))
    .bind(non_empty(map.value(row, PHONE)))
    .bind(hire_date)
    .bind(status)
    .execute(&mut *conn)
    .await?;

    Ok(if exists {
        RowOutcome::Updated
    } else {
        RowOutcome::Inserted
    })
}
