use crate::{
    api::{
        activity_logs, attendance, cash, dashboard, employee, error_logs, import, projects, users,
    },
    auth::{handlers, middleware::auth_middleware},
    config::Config,
    docs::ApiDoc,
    error::AppError,
    utils::error_capture::capture_errors,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{
    App, Error, ResponseError,
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    http::StatusCode,
    middleware::{Condition, Logger, NormalizePath, from_fn},
    web,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Limiter {
    // a zero rate is switched off by `guarded`, the governor still needs a valid quota
    let burst = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request((60_000 / burst as u64).max(1))
        .burst_size(burst)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Arc::new(Governor::new(&cfg))
}

fn guarded(limiter: &Limiter, requests_per_min: u32) -> Condition<Limiter> {
    Condition::new(requests_per_min > 0, limiter.clone())
}

/// The whole application: shared state, middleware, docs and routes.
pub fn build_app(
    pool: SqlitePool,
    config: Config,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    // base64 inflates photos by a third, plus room for the other fields
    let json_limit = config.max_photo_bytes / 3 * 4 + 64 * 1024;

    let json_config = web::JsonConfig::default()
        .limit(json_limit)
        .error_handler(|err, _req| {
            if err.status_code() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::PayloadTooLarge(err.to_string()).into()
            } else {
                AppError::BadRequest(err.to_string()).into()
            }
        });

    let route_config = config.clone();

    App::new()
        .wrap(from_fn(capture_errors))
        .wrap(NormalizePath::trim())
        .wrap(Logger::default())
        .service(
            // wildcard {_:.*} so the JS/CSS assets match
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-doc/openapi.json", ApiDoc::openapi()),
        )
        .app_data(web::Data::new(pool))
        .app_data(web::Data::new(config.clone()))
        .app_data(json_config)
        .app_data(web::PayloadConfig::new(config.max_import_bytes))
        .configure(move |cfg| configure(cfg, route_config))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let login_limiter = build_limiter(config.rate_login_per_min);
    let refresh_limiter = build_limiter(config.rate_refresh_per_min);
    let kiosk_limiter = build_limiter(config.rate_kiosk_per_min);
    let protected_limiter = build_limiter(config.rate_protected_per_min);

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(guarded(&login_limiter, config.rate_login_per_min))
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(guarded(&refresh_limiter, config.rate_refresh_per_min))
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(guarded(&login_limiter, config.rate_login_per_min))
                    .route(web::post().to(handlers::logout)),
            ),
    );

    cfg.service(
        web::scope("/kiosk").service(
            web::resource("/clock")
                .wrap(guarded(&kiosk_limiter, config.rate_kiosk_per_min))
                .route(web::post().to(attendance::kiosk_clock)),
        ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .wrap(guarded(&protected_limiter, config.rate_protected_per_min))
            .service(web::resource("/me").route(web::get().to(handlers::me)))
            .service(web::resource("/dashboard").route(web::get().to(dashboard::dashboard)))
            .service(
                web::scope("/users")
                    .service(
                        web::resource("")
                            .route(web::get().to(users::list_users))
                            .route(web::post().to(users::create_user)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(users::get_user))
                            .route(web::put().to(users::update_user))
                            .route(web::delete().to(users::delete_user)),
                    ),
            )
            .service(
                web::scope("/employees")
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(employee::update_employee))
                            .route(web::get().to(employee::get_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    ),
            )
            .service(
                web::scope("/projects")
                    .service(
                        web::resource("")
                            .route(web::get().to(projects::list_projects))
                            .route(web::post().to(projects::create_project)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(projects::get_project))
                            .route(web::put().to(projects::update_project))
                            .route(web::delete().to(projects::delete_project)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    .service(
                        web::resource("")
                            .route(web::get().to(attendance::list_attendance))
                            .route(web::post().to(attendance::clock)),
                    )
                    // fixed segments before /{id}
                    .service(
                        web::resource("/status").route(web::get().to(attendance::attendance_status)),
                    )
                    .service(
                        web::resource("/export").route(web::get().to(attendance::export_attendance)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(attendance::get_attendance))
                            .route(web::delete().to(attendance::delete_attendance)),
                    )
                    .service(
                        web::resource("/{id}/photo")
                            .route(web::get().to(attendance::attendance_photo)),
                    ),
            )
            .service(web::resource("/import/{target}").route(web::post().to(import::import_file)))
            .service(
                web::scope("/cash")
                    .service(web::resource("/receives").route(web::get().to(cash::list_receives)))
                    .service(web::resource("/payments").route(web::get().to(cash::list_payments))),
            )
            .service(
                web::scope("/error-logs")
                    .service(
                        web::resource("")
                            .route(web::get().to(error_logs::list_error_logs))
                            .route(web::delete().to(error_logs::clear_error_logs)),
                    )
                    .service(
                        web::resource("/export").route(web::get().to(error_logs::export_error_logs)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(error_logs::get_error_log))
                            .route(web::delete().to(error_logs::delete_error_log)),
                    ),
            )
            .service(
                web::resource("/activity-logs")
                    .route(web::get().to(activity_logs::list_activity_logs)),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ rotates both tokens, the old refresh token is revoked
