use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::config::Config;
use crate::handlers::{ApiError, ErrorResponse};
use crate::models::{Claims, Person, Role};
use crate::services::Actor;
use crate::AppState;

/// Extractor that validates the bearer JWT and provides the caller's claims.
///
/// Add `auth: AuthUser` to a handler's parameters to require authentication,
/// then gate on role with `require_role` / `require_any`. The role is the
/// account's current one: a deleted account's token stops working and a
/// role change applies to tokens already issued.
pub struct AuthUser {
    pub claims: Claims,
    person_id: i64,
    role: Role,
}

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.person_id
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.person_id, self.role)
    }

    pub fn require_role(&self, role: Role) -> Result<(), ApiError> {
        self.require_any(&[role])
    }

    pub fn require_any(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::forbidden(format!(
                "role {} is not allowed to perform this action",
                self.role
            )))
        }
    }
}

#[async_trait::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        let token = header.strip_prefix("Bearer ").ok_or(AuthError::InvalidToken)?;

        let claims = decode_token(&state.config, token).ok_or(AuthError::InvalidToken)?;
        let person_id = claims.person_id().ok_or(AuthError::InvalidToken)?;

        let person = state
            .store
            .get_person(person_id)
            .await
            .map_err(|e| {
                tracing::error!("Failed to load authenticated person {}: {:#}", person_id, e);
                AuthError::Unavailable
            })?
            .ok_or(AuthError::InvalidToken)?;
        if person.role != claims.role {
            tracing::debug!("Person {} role changed to {} since token was issued", person_id, person.role);
        }

        Ok(AuthUser { claims, person_id, role: person.role })
    }
}

/// Sign a token for a person with the configured lifetime
pub fn issue_token(config: &Config, person: &Person) -> anyhow::Result<String> {
    let now = chrono::Utc::now();
    let exp = now + chrono::TimeDelta::hours(config.jwt_ttl_hours);

    let claims = Claims {
        sub: person.id.to_string(),
        email: person.email.clone(),
        role: person.role,
        exp: exp.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("token generation error: {}", e))
}

fn decode_token(config: &Config, token: &str) -> Option<Claims> {
    jsonwebtoken::decode::<Claims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

pub enum AuthError {
    MissingToken,
    InvalidToken,
    Unavailable,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authentication token"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::Unavailable => (StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            jwt_secret: "test-secret".to_string(),
            ..Config::default()
        }
    }

    fn person(role: Role) -> Person {
        let now = chrono::Utc::now();
        Person {
            id: 42,
            first_name: "Sara".to_string(),
            last_name: "Alaoui".to_string(),
            email: "sara@example.com".to_string(),
            phone: None,
            address: None,
            role,
            verified: true,
            owner_request: false,
            password_hash: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let cfg = config();
        let token = issue_token(&cfg, &person(Role::Landlord)).unwrap();
        let claims = decode_token(&cfg, &token).unwrap();
        assert_eq!(claims.person_id(), Some(42));
        assert_eq!(claims.role, Role::Landlord);
        assert_eq!(claims.email, "sara@example.com");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(&config(), &person(Role::Tenant)).unwrap();
        let other = Config {
            jwt_secret: "another-secret".to_string(),
            ..Config::default()
        };
        assert!(decode_token(&other, &token).is_none());
    }

    #[test]
    fn test_role_gates() {
        let user = AuthUser {
            claims: Claims {
                sub: "7".to_string(),
                email: "t@example.com".to_string(),
                role: Role::Tenant,
                exp: 0,
                iat: 0,
            },
            person_id: 7,
            role: Role::Tenant,
        };
        assert!(user.require_role(Role::Tenant).is_ok());
        assert!(user.require_role(Role::Admin).is_err());
        assert!(user.require_any(&[Role::Admin, Role::Tenant]).is_ok());
        assert!(!user.is_admin());
        assert_eq!(user.actor(), Actor::new(7, Role::Tenant));
    }
}
