use crate::{
    auth::auth::AuthUser,
    utils::audit::{ErrorEntry, record_error},
};
use actix_web::{
    Error, HttpMessage,
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    http::StatusCode,
    middleware::Next,
    web::Data,
};
use sqlx::SqlitePool;
use tracing::error;

struct Failure<'a> {
    method: &'a str,
    path: &'a str,
    status: StatusCode,
    details: Option<String>,
    username: Option<String>,
}

async fn persist(pool: Option<&Data<SqlitePool>>, failure: Failure<'_>) {
    let message = failure
        .status
        .canonical_reason()
        .unwrap_or("Server error");

    error!(
        method = failure.method,
        path = failure.path,
        status = failure.status.as_u16(),
        username = ?failure.username,
        details = ?failure.details,
        "{message}"
    );

    if let Some(pool) = pool {
        record_error(
            pool.get_ref(),
            ErrorEntry {
                level: "error",
                message,
                path: Some(failure.path),
                method: Some(failure.method),
                status_code: Some(failure.status.as_u16()),
                details: failure.details.as_deref(),
                username: failure.username.as_deref(),
            },
        )
        .await;
    }
}

/// Records every 5xx response in `error_logs` and the log file.
pub async fn capture_errors(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let pool = req.app_data::<Data<SqlitePool>>().cloned();
    let method = req.method().to_string();
    let path = req.path().to_string();

    match next.call(req).await {
        Ok(res) => {
            let status = res.status();
            if status.is_server_error() {
                let failure = Failure {
                    method: &method,
                    path: &path,
                    status,
                    details: res.response().error().map(|e| e.to_string()),
                    username: res
                        .request()
                        .extensions()
                        .get::<AuthUser>()
                        .map(|u| u.username.clone()),
                };
                persist(pool.as_ref(), failure).await;
            }
            Ok(res)
        }
        Err(e) => {
            let status = e.as_response_error().status_code();
            if status.is_server_error() {
                let failure = Failure {
                    method: &method,
                    path: &path,
                    status,
                    details: Some(e.to_string()),
                    username: None,
                };
                persist(pool.as_ref(), failure).await;
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{model::role::Role, test_support::TestContext};
    use actix_web::{http::StatusCode, test};

    #[actix_web::test]
    async fn server_errors_are_persisted() {
        let ctx = TestContext::new().await;
        sqlx::query("DROP TABLE cash_payments")
            .execute(&ctx.pool)
            .await
            .unwrap();
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::get()
            .uri("/api/cash/payments")
            .insert_header(ctx.bearer_for("hr-user", Role::Hr, None))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let (status, path, username): (i64, String, Option<String>) =
            sqlx::query_as("SELECT status_code, path, username FROM error_logs")
                .fetch_one(&ctx.pool)
                .await
                .unwrap();
        assert_eq!(status, 500);
        assert_eq!(path, "/api/cash/payments");
        assert_eq!(username.as_deref(), Some("hr-user"));
    }

    #[actix_web::test]
    async fn client_errors_are_not_persisted() {
        let ctx = TestContext::new().await;
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::get().uri("/api/dashboard").to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM error_logs")
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
