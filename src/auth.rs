use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::{async_trait, RequestPartsExt};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::api::AppState;
use crate::engine::EngineError;
use crate::model::{Actor, Role, User};

/// Both bcrypt calls run on the blocking pool.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, EngineError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| EngineError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| EngineError::Internal(format!("password hashing failed: {e}")))
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool, EngineError> {
    let (password, hash) = (password.to_owned(), hash.to_owned());
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| EngineError::Internal(format!("password check task failed: {e}")))?
        .map_err(|e| EngineError::Internal(format!("password check failed: {e}")))
}

/// Bearer token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Ulid,
    pub user_role: Role,
    /// Seconds since the epoch.
    pub exp: i64,
}

/// HS256 signing material plus token lifetime.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: TimeDelta,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl: TimeDelta) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, EngineError> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, EngineError> {
        let claims = Claims {
            user_id: user.id,
            user_role: user.role,
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| EngineError::Internal(format!("token signing failed: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, EngineError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("rejected bearer token: {e}");
                EngineError::Unauthorized("invalid or expired token")
            })
    }
}

/// The caller, authenticated from the `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Actor);

impl AuthUser {
    pub fn id(&self) -> Ulid {
        self.0.user_id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = EngineError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| EngineError::Unauthorized("missing bearer token"))?;
        let claims = state.tokens.verify(bearer.token())?;
        Ok(Self(Actor {
            user_id: claims.user_id,
            role: claims.user_role,
        }))
    }
}

/// An authenticated caller holding the admin role.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = EngineError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(actor) = AuthUser::from_request_parts(parts, state).await?;
        if !actor.is_admin() {
            return Err(EngineError::Forbidden("admin role required"));
        }
        Ok(Self(actor))
    }
}
