use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::{
    attendance::Attendance,
    employee::Employee,
    log::{ActivityLog, ErrorLog},
    project::Project,
    role::Role,
    user::UserView,
};

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "admin")]
    pub username: String,
    #[schema(example = "change-me-please")]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 0 for principals that do not live in the users table
    pub user_id: i64,
    pub sub: String,
    pub role: Role,
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    pub source: AuthSource,
    /// Present only if this user is linked to an employee record
    pub employee_code: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// Where a principal was authenticated from.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuthSource {
    User,
    LegacyAdmin,
    Env,
}

/// The identity a token is minted for.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub employee_code: Option<String>,
    pub source: AuthSource,
}

impl From<&Claims> for Principal {
    fn from(c: &Claims) -> Self {
        Self {
            user_id: c.user_id,
            username: c.sub.clone(),
            role: c.role,
            employee_code: c.employee_code.clone(),
            source: c.source,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub role: Role,
}

/// Shared pagination envelope for list endpoints.
#[derive(Serialize, ToSchema)]
#[aliases(
    EmployeePage = Page<Employee>,
    ProjectPage = Page<Project>,
    AttendancePage = Page<Attendance>,
    UserPage = Page<UserView>,
    ErrorLogPage = Page<ErrorLog>,
    ActivityLogPage = Page<ActivityLog>
)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

pub fn paging(page: Option<u32>, per_page: Option<u32>) -> (u32, u32, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(20).clamp(1, 100);
    let offset = (page as i64 - 1) * per_page as i64;
    (page, per_page, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_clamps() {
        assert_eq!(paging(None, None), (1, 20, 0));
        assert_eq!(paging(Some(0), Some(500)), (1, 100, 0));
        assert_eq!(paging(Some(3), Some(10)), (3, 10, 20));
    }
}
