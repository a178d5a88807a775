use crate::{
    config::Config,
    error::AppError,
    model::role::Role,
    models::{AuthSource, Principal, TokenType},
};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

use super::jwt::verify_token;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub source: AuthSource,

    /// Present only if this user is linked to an employee record
    pub employee_code: Option<String>,
}

impl From<Principal> for AuthUser {
    fn from(p: Principal) -> Self {
        Self {
            user_id: p.user_id,
            username: p.username,
            role: p.role,
            source: p.source,
            employee_code: p.employee_code,
        }
    }
}

/// Resolves the caller from a `Bearer` access token.
pub fn authenticate(req: &HttpRequest) -> Result<AuthUser, AppError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;

    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| AppError::Internal("Config missing".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    if claims.token_type != TokenType::Access {
        return Err(AppError::Unauthorized("Access token required".into()));
    }

    Ok(Principal::from(&claims).into())
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // the middleware has usually done the work already
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }
        ready(authenticate(req).map_err(Into::into))
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin only".into()))
        }
    }

    pub fn require_hr_or_admin(&self) -> Result<(), AppError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden("HR/Admin only".into()))
        }
    }

    /// Returns true if the user is an employee
    pub fn is_employee(&self) -> bool {
        self.role == Role::Employee
    }
}
