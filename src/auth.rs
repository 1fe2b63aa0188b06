use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::Role,
    repository::RepositoryState,
};

/// Claims
///
/// The JWT payload issued by the identity provider. Only `sub` is trusted for identity;
/// the role is always re-read from the user store so an admin role change applies to the
/// very next request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID, primary key of the `users` table.
    pub sub: Uuid,
    /// Expiration Time (exp): tokens past this timestamp are rejected.
    pub exp: usize,
    /// Issued At (iat).
    pub iat: usize,
}

/// AuthUser
///
/// The resolved principal of an authenticated request. Passed explicitly into every
/// operation that needs it; nothing in the core reads a "current user" from global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

const DEV_USER_HEADER: &str = "x-user-id";

/// AuthUser Extractor Implementation
///
/// 1. Dependency Resolution: the repository and `AppConfig` from the application state.
/// 2. Local Bypass: in `Env::Local` an `x-user-id` header naming an existing user is accepted.
/// 3. Token Validation: Bearer extraction and JWT decoding (signature, expiry, optional audience).
/// 4. User Store Lookup: the token's subject must still exist; its stored role is used.
///
/// Rejection: `AppError::Unauthenticated` (401) on any failure, `AppError::Internal` if the
/// user store itself fails.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // 1. Dependency Resolution
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // 2. Local Development Bypass Check
        if config.env == Env::Local {
            if let Some(user_id) = parts
                .headers
                .get(DEV_USER_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| Uuid::parse_str(raw).ok())
            {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(AuthUser {
                        id: user.id,
                        role: user.role,
                    });
                }
            }
        }

        // 3. Token Extraction
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthenticated)?;

        // 4. JWT Decoding Setup (audience is only checked when configured)
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;
        match &config.jwt_audience {
            Some(aud) => validation.set_audience(&[aud.as_str()]),
            None => validation.validate_aud = false,
        }

        // 5. Decode and Validate the Token
        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                other => tracing::debug!(reason = ?other, "rejected invalid token"),
            }
            AppError::Unauthenticated
        })?;

        // 6. User Store Lookup (Final Verification)
        // A valid token for a user that no longer exists is not a session.
        let user = repo
            .get_user(token_data.claims.sub)
            .await?
            .ok_or(AppError::Unauthenticated)?;

        Ok(AuthUser {
            id: user.id,
            role: user.role,
        })
    }
}

/// MaybeAuthUser
///
/// Optional principal for public reads. A request without credentials resolves to `None`;
/// a request that presents credentials must present valid ones.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let presents_credentials = parts.headers.contains_key(header::AUTHORIZATION)
            || parts.headers.contains_key(DEV_USER_HEADER);
        if !presents_credentials {
            return Ok(MaybeAuthUser(None));
        }
        AuthUser::from_request_parts(parts, state)
            .await
            .map(|user| MaybeAuthUser(Some(user)))
    }
}
