//! Bearer token authentication.
//!
//! Identity is issued by an external service; this layer only verifies the
//! HS256 signature and expiry, and exposes the caller's id and plan tier.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use clipnote_models::PlanTier;

use crate::error::ApiError;
use crate::state::AppState;

/// Decoded bearer token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Plan tier name ("free", "creator", "studio")
    #[serde(default)]
    pub plan: Option<String>,
    /// Expiration (unix seconds)
    pub exp: i64,
}

/// Authenticated user extracted from the request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub plan: PlanTier,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            uid: claims.sub,
            plan: claims
                .plan
                .as_deref()
                .map(PlanTier::parse)
                .unwrap_or_default(),
        }
    }
}

/// Verify a bearer token against the shared secret.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| ApiError::unauthorized(format!("Invalid token: {e}")))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Expected Bearer token"))?;

        let claims = verify_token(token, &state.config.jwt_secret)?;
        Ok(AuthUser::from(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("encode token")
    }

    #[test]
    fn valid_token_round_trips() {
        let claims = Claims {
            sub: "user-1".into(),
            plan: Some("creator".into()),
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let token = make_token(&claims, "secret");

        let decoded = verify_token(&token, "secret").expect("verifies");
        let user = AuthUser::from(decoded);
        assert_eq!(user.uid, "user-1");
        assert_eq!(user.plan, PlanTier::Creator);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let claims = Claims {
            sub: "user-1".into(),
            plan: None,
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let token = make_token(&claims, "secret");

        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let claims = Claims {
            sub: "user-1".into(),
            plan: None,
            exp: chrono::Utc::now().timestamp() - 3600,
        };
        let token = make_token(&claims, "secret");

        assert!(verify_token(&token, "secret").is_err());
    }

    #[test]
    fn missing_plan_defaults_to_free() {
        let claims = Claims {
            sub: "user-1".into(),
            plan: None,
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let user = AuthUser::from(claims);
        assert_eq!(user.plan, PlanTier::Free);
    }
}
