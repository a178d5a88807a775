use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    error::{AppError, AppResult},
    models::{Claims, Principal, TokenType},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

fn now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or(0)
}

fn issue(
    principal: &Principal,
    token_type: TokenType,
    secret: &str,
    ttl: usize,
) -> AppResult<(String, Claims)> {
    let claims = Claims {
        user_id: principal.user_id,
        sub: principal.username.clone(),
        role: principal.role,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
        source: principal.source,
        employee_code: principal.employee_code.clone(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token encoding failed: {e}")))?;

    Ok((token, claims))
}

pub fn generate_access_token(principal: &Principal, secret: &str, ttl: usize) -> AppResult<String> {
    issue(principal, TokenType::Access, secret, ttl).map(|(token, _)| token)
}

pub fn generate_refresh_token(
    principal: &Principal,
    secret: &str,
    ttl: usize,
) -> AppResult<(String, Claims)> {
    issue(principal, TokenType::Refresh, secret, ttl)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}
