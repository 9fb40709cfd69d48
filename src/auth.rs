use axum::{
    extract::FromRef,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::AppConfig, errors::ServiceError, AppState};

/// JWT claim set for the opaque principal. Account management lives outside
/// this service; the token is the only contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

/// The verified caller identity extracted from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl AuthenticatedUser {
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "administrator access required".to_string(),
            ))
        }
    }
}

/// Issues a signed token for the given principal. Used by tests and
/// operational tooling; the real identity provider mints its own.
pub fn issue_token(
    user_id: Uuid,
    is_admin: bool,
    cfg: &AppConfig,
) -> Result<String, ServiceError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        is_admin,
        iat: now,
        exp: now + cfg.jwt_expiration_secs as i64,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {e}")))
}

fn verify_token(token: &str, cfg: &AppConfig) -> Result<AuthenticatedUser, ServiceError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {e}")))?;

    let user_id = Uuid::parse_str(&data.claims.sub)
        .map_err(|_| ServiceError::Unauthorized("malformed subject claim".to_string()))?;

    Ok(AuthenticatedUser {
        user_id,
        is_admin: data.claims.is_admin,
    })
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized("missing authorization header".to_string())
            })?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("expected bearer token".to_string()))?
            .trim();

        verify_token(token, &app.config)
    }
}
