use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

use super::role::Role;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub employee_code: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

/// `User` without the password hash.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserView {
    #[schema(example = 1)]
    pub id: i64,
    #[schema(example = "jdoe")]
    pub username: String,
    pub role: Role,
    #[schema(example = "EMP-001", nullable = true)]
    pub employee_code: Option<String>,
    pub is_active: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_at: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            role: u.role,
            employee_code: u.employee_code,
            is_active: u.is_active,
            last_login_at: u.last_login_at,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LegacyAdmin {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}
