use crate::api::{
    attendance::{ClockRequest, ClockStatus},
    cash::{CashPaymentPage, CashReceivePage},
    dashboard::DashboardSummary,
    employee::{CreateEmployee, UpdateEmployee},
    projects::{CreateProject, UpdateProject},
    users::{CreateUser, UpdateUser},
};
use crate::import::{ImportReport, RowIssue};
use crate::model::{
    attendance::{Attendance, ClockAction},
    cash::{CashPayment, CashReceive},
    employee::Employee,
    log::{ActivityLog, ErrorLog},
    project::Project,
    role::Role,
    user::UserView,
};
use crate::models::{
    ActivityLogPage, AttendancePage, AuthSource, EmployeePage, ErrorLogPage, LoginReqDto,
    LoginResponse, ProjectPage, UserPage,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Timeclock API",
        version = "1.0.0",
        description = r#"
## Attendance & HR records

Clock in/out with optional geolocation and photo, project and employee
records, spreadsheet imports and an admin view of errors and activity.

### 🔐 Security
`/api` endpoints need a **JWT Bearer** access token from `/auth/login`.
Roles are **admin**, **hr** and **employee**. `/kiosk/clock` is public and
rate limited.

### 📦 Response Format
- JSON bodies; errors are `{"error": "..."}` with the matching status
- Pagination (`page`, `per_page`) on list endpoints
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::users::create_user,
        crate::api::users::list_users,
        crate::api::users::get_user,
        crate::api::users::update_user,
        crate::api::users::delete_user,

        crate::api::attendance::clock,
        crate::api::attendance::kiosk_clock,
        crate::api::attendance::list_attendance,
        crate::api::attendance::attendance_status,
        crate::api::attendance::get_attendance,
        crate::api::attendance::attendance_photo,
        crate::api::attendance::delete_attendance,
        crate::api::attendance::export_attendance,

        crate::api::projects::create_project,
        crate::api::projects::list_projects,
        crate::api::projects::get_project,
        crate::api::projects::update_project,
        crate::api::projects::delete_project,

        crate::api::employee::create_employee,
        crate::api::employee::get_employee,
        crate::api::employee::list_employees,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,

        crate::api::import::import_file,

        crate::api::cash::list_receives,
        crate::api::cash::list_payments,

        crate::api::error_logs::list_error_logs,
        crate::api::error_logs::get_error_log,
        crate::api::error_logs::export_error_logs,
        crate::api::error_logs::delete_error_log,
        crate::api::error_logs::clear_error_logs,
        crate::api::activity_logs::list_activity_logs,

        crate::api::dashboard::dashboard
    ),
    components(
        schemas(
            LoginReqDto,
            LoginResponse,
            Role,
            AuthSource,
            UserView,
            UserPage,
            CreateUser,
            UpdateUser,
            ClockAction,
            ClockRequest,
            ClockStatus,
            Attendance,
            AttendancePage,
            Project,
            ProjectPage,
            CreateProject,
            UpdateProject,
            Employee,
            EmployeePage,
            CreateEmployee,
            UpdateEmployee,
            ImportReport,
            RowIssue,
            CashReceive,
            CashPayment,
            CashReceivePage,
            CashPaymentPage,
            ErrorLog,
            ErrorLogPage,
            ActivityLog,
            ActivityLogPage,
            DashboardSummary
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token refresh and logout"),
        (name = "User", description = "User management (admin)"),
        (name = "Attendance", description = "Clock in/out and attendance records"),
        (name = "Project", description = "Project management"),
        (name = "Employee", description = "Employee records"),
        (name = "Import", description = "Spreadsheet imports"),
        (name = "Cash", description = "Cash receives and payments"),
        (name = "Logs", description = "Error and activity logs (admin)"),
        (name = "Dashboard", description = "Summary counts"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
