/*!
 * # Bearer authentication
 *
 * Tokens are issued by the external auth service; this module only verifies
 * HS256 JWTs with the shared secret and exposes the caller to handlers via
 * the [`AuthUser`] and [`AdminUser`] extractors.
 */

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{errors::ServiceError, AppState};

pub const ADMIN_ROLE: &str = "admin";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: i64,
}

/// Verifies bearer tokens against the configured secret.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthUser, ServiceError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(error = %e, "bearer token rejected");
            ServiceError::Unauthorized("invalid or expired token".into())
        })?;
        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| ServiceError::Unauthorized("token subject is not a user id".into()))?;
        Ok(AuthUser {
            user_id,
            email: data.claims.email,
            roles: data.claims.roles,
        })
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, ServiceError> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".into()))?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".into()))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        state.jwt.verify(token)
    }
}

/// Authenticated caller holding the `admin` role
#[derive(Debug, Clone, PartialEq)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ServiceError::Forbidden("admin role required".into()));
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "unit-test-secret-with-enough-entropy-0123456789";

    fn token(sub: &str, roles: &[&str], exp_offset: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            email: Some("ama@example.com".into()),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_user() {
        let user_id = Uuid::new_v4();
        let user = JwtVerifier::new(SECRET)
            .verify(&token(&user_id.to_string(), &["admin"], 600))
            .unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.email.as_deref(), Some("ama@example.com"));
        assert!(user.is_admin());
    }

    #[test]
    fn expired_wrong_secret_and_bad_subject_are_rejected() {
        let verifier = JwtVerifier::new(SECRET);
        let id = Uuid::new_v4().to_string();
        assert!(verifier.verify(&token(&id, &[], -3600)).is_err());
        assert!(verifier.verify(&token("not-a-uuid", &[], 600)).is_err());
        assert!(JwtVerifier::new("another-secret-entirely-0123456789abcdef")
            .verify(&token(&id, &[], 600))
            .is_err());
    }
}
