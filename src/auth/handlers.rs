use crate::{
    auth::{
        auth::AuthUser,
        jwt::verify_token,
        service::{issue_tokens, refresh_principal, resolve_credentials, revoke_refresh_token},
    },
    config::Config,
    error::AppError,
    models::{AuthSource, LoginReqDto, TokenType},
    utils::audit::{client_ip, record_activity},
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use tracing::{debug, error, info, instrument};

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 400, description = "Username or password missing"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user, req),
    fields(username = %user.username)
)]
pub async fn login(
    req: HttpRequest,
    user: web::Json<LoginReqDto>,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    info!("Login request received");

    let username = user.username.trim();
    if username.is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return Err(AppError::BadRequest("Username or password required".into()));
    }

    let ip = client_ip(&req);

    let principal = match resolve_credentials(pool.get_ref(), &config, username, &user.password).await
    {
        Ok(p) => p,
        Err(e) => {
            if matches!(e, AppError::Unauthorized(_)) {
                record_activity(
                    pool.get_ref(),
                    Some(username),
                    "login_failed",
                    None,
                    ip.as_deref(),
                )
                .await;
            }
            return Err(e);
        }
    };

    let tokens = issue_tokens(pool.get_ref(), &config, &principal).await?;

    if principal.source == AuthSource::User {
        debug!("Updating last_login_at");
        if let Err(e) = sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(Utc::now().naive_utc())
            .bind(principal.user_id)
            .execute(pool.get_ref())
            .await
        {
            error!(error = %e, "Failed to update last_login_at");
            // intentionally not failing login
        }
    }

    record_activity(
        pool.get_ref(),
        Some(&principal.username),
        "login",
        Some(principal.source.as_ref()),
        ip.as_deref(),
    )
    .await;

    info!(source = %principal.source, "Login successful");

    Ok(HttpResponse::Ok().json(tokens))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = LoginResponse),
        (status = 401, description = "Missing, invalid, or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let token = bearer(&req).ok_or_else(|| AppError::Unauthorized("No token".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }

    // revoke first so a replayed token cannot mint a second pair
    if !revoke_refresh_token(pool.get_ref(), &claims.jti).await? {
        info!(jti = %claims.jti, "Refresh with unknown or revoked token");
        return Err(AppError::Unauthorized("Token revoked".into()));
    }

    let principal = refresh_principal(pool.get_ref(), &claims).await?;
    let tokens = issue_tokens(pool.get_ref(), &config, &principal).await?;

    Ok(HttpResponse::Ok().json(tokens))
}

/// Logout (revokes the refresh token)
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return HttpResponse::NoContent().finish(),
    };

    // only refresh tokens can logout
    if claims.token_type != TokenType::Refresh {
        return HttpResponse::NoContent().finish();
    }

    // idempotent, success even if the token didn't exist
    if let Err(e) = revoke_refresh_token(pool.get_ref(), &claims.jti).await {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

/// Current principal
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Authenticated principal", body = Object, example = json!({
            "user_id": 1, "username": "admin", "role": "admin", "source": "user", "employee_code": null
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "user_id": auth.user_id,
        "username": auth.username,
        "role": auth.role,
        "source": auth.source,
        "employee_code": auth.employee_code,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::password::hash_password, test_support};
    use actix_web::{http::StatusCode, test};
    use serde_json::Value;

    async fn seed_user(pool: &SqlitePool, username: &str, password: &str, role: &str) {
        sqlx::query("INSERT INTO users (username, password_hash, role) VALUES (?, ?, ?)")
            .bind(username)
            .bind(hash_password(password).unwrap())
            .bind(role)
            .execute(pool)
            .await
            .unwrap();
    }

    #[actix_web::test]
    async fn admin_login_rejects_wrong_password() {
        let ctx = test_support::TestContext::new().await;
        seed_user(&ctx.pool, "boss", "right-password", "admin").await;
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "boss", "password": "wrong-password"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let failures: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM activity_logs WHERE action = 'login_failed'",
        )
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
        assert_eq!(failures, 1);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "boss", "password": "right-password"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["role"], "admin");
        assert!(body["access_token"].as_str().is_some());
    }

    #[actix_web::test]
    async fn empty_credentials_are_a_bad_request() {
        let ctx = test_support::TestContext::new().await;
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "  ", "password": ""}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn legacy_admin_and_env_admin_can_log_in() {
        let ctx = test_support::TestContext::new().await;
        sqlx::query("INSERT INTO legacy_admins (username, password_hash) VALUES (?, ?)")
            .bind("oldadmin")
            .bind(hash_password("legacy-pass").unwrap())
            .execute(&ctx.pool)
            .await
            .unwrap();
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "oldadmin", "password": "legacy-pass"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["role"], "admin");

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "oldadmin", "password": "nope"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        // configured in Config::for_tests
        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "root", "password": "root-password"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "root", "password": "guess"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn users_table_shadows_env_admin() {
        let ctx = test_support::TestContext::new().await;
        seed_user(&ctx.pool, "root", "table-password", "employee").await;
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "root", "password": "root-password"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn inactive_user_cannot_log_in() {
        let ctx = test_support::TestContext::new().await;
        seed_user(&ctx.pool, "gone", "some-password", "employee").await;
        sqlx::query("UPDATE users SET is_active = 0 WHERE username = 'gone'")
            .execute(&ctx.pool)
            .await
            .unwrap();
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "gone", "password": "some-password"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn refresh_rotates_and_revokes() {
        let ctx = test_support::TestContext::new().await;
        seed_user(&ctx.pool, "worker", "worker-pass", "employee").await;
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"username": "worker", "password": "worker-pass"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let refresh = body["refresh_token"].as_str().unwrap().to_string();
        let access = body["access_token"].as_str().unwrap().to_string();

        // an access token cannot be used to refresh
        let req = test::TestRequest::post()
            .uri("/auth/refresh")
            .insert_header(("Authorization", format!("Bearer {access}")))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let req = test::TestRequest::post()
            .uri("/auth/refresh")
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // replaying the old refresh token fails
        let req = test::TestRequest::post()
            .uri("/auth/refresh")
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn protected_routes_need_a_token() {
        let ctx = test_support::TestContext::new().await;
        let app = test::init_service(ctx.app()).await;

        let req = test::TestRequest::get().uri("/api/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/me")
            .insert_header(ctx.bearer_for("hr1", crate::model::role::Role::Hr, None))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["username"], "hr1");
        assert_eq!(body["role"], "hr");
    }
}
