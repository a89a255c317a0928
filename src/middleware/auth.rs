//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs carrying the caller's user id and role. Handlers take
//! [`AuthenticatedUser`] or [`ManagerUser`] as extractors and pass the resulting
//! [`Principal`] into the use-case layer explicitly.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Principal, Role};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, role: Role, expires_in: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
        }
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtConfig {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 30;
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
    }

    pub fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding_key, &self.validation).map(|data| data.claims)
    }

    /// Signs a token for `user_id` valid for `ttl`.
    pub fn issue(
        &self,
        user_id: Uuid,
        role: Role,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.encode(&Claims::new(user_id, role, ttl))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    ExpiredToken,
    InsufficientPermissions,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => {
                AppError::Unauthorized("Authorization header required".to_string())
            }
            AuthError::InvalidToken => {
                AppError::Unauthorized("Invalid or malformed token".to_string())
            }
            AuthError::ExpiredToken => AppError::Unauthorized("Token has expired".to_string()),
            AuthError::InsufficientPermissions => {
                AppError::Forbidden("Insufficient permissions for this action".to_string())
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

/// Any caller holding a valid token.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    JwtConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jwt = JwtConfig::from_ref(state);

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidToken)?;

        let claims = jwt.decode(token).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            _ => AuthError::InvalidToken,
        })?;

        Ok(AuthenticatedUser(Principal::new(claims.sub, claims.role)))
    }
}

/// A caller holding a valid manager token.
#[derive(Debug, Clone, Copy)]
pub struct ManagerUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for ManagerUser
where
    JwtConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(principal) =
            AuthenticatedUser::from_request_parts(parts, state).await?;
        if !principal.is_manager() {
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(ManagerUser(principal))
    }
}
