use crate::{
    auth::jwt::generate_access_token,
    config::Config,
    db::test_pool,
    model::{role::Role, user::User},
    models::{AuthSource, Principal},
    routes::build_app,
};
use actix_web::{
    App, Error,
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::Path;
use tempfile::TempDir;

/// A migrated in-memory database plus a throwaway upload directory.
pub struct TestContext {
    pub pool: SqlitePool,
    pub config: Config,
    dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config::for_tests(dir.path().to_path_buf());
        Self {
            pool: test_pool().await,
            config,
            dir,
        }
    }

    /// The app owns clones of the pool and config, so it does not borrow `self`.
    pub fn app(
        &self,
    ) -> App<
        impl ServiceFactory<
            ServiceRequest,
            Config = (),
            Response = ServiceResponse<impl MessageBody + use<>>,
            Error = Error,
            InitError = (),
        > + use<>,
    > {
        build_app(self.pool.clone(), self.config.clone())
    }

    pub fn upload_dir(&self) -> &Path {
        self.dir.path()
    }

    fn bearer(&self, principal: &Principal) -> (&'static str, String) {
        let token = generate_access_token(principal, &self.config.jwt_secret, 300)
            .expect("access token");
        ("Authorization", format!("Bearer {token}"))
    }

    /// Authorization header for a principal that is not in the users table.
    pub fn bearer_for(
        &self,
        username: &str,
        role: Role,
        employee_code: Option<&str>,
    ) -> (&'static str, String) {
        self.bearer(&Principal {
            user_id: 0,
            username: username.to_string(),
            role,
            employee_code: employee_code.map(str::to_string),
            source: AuthSource::Env,
        })
    }

    pub fn bearer_for_user(&self, user: &User) -> (&'static str, String) {
        self.bearer(&Principal {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            employee_code: user.employee_code.clone(),
            source: AuthSource::User,
        })
    }

    pub async fn seed_employee(&self, code: &str, status: &str) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO employees (employee_code, full_name, status) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(code)
        .bind(format!("Employee {code}"))
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .expect("seed employee")
    }

    pub async fn seed_project(&self, name: &str, active: bool) -> i64 {
        let now = Utc::now().naive_utc();
        sqlx::query_scalar(
            "INSERT INTO projects (name, is_active, created_at, updated_at) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(active)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .expect("seed project")
    }
}
