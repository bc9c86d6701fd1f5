use axum::{
    extract::{FromRef, FromRequestParts},
    http::header,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Principal kind carried in the token. Consumers shop, sellers manage the
/// catalog and order statuses; the two live in separate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Consumer,
    Seller,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub scope: Scope,
    pub exp: usize,
}

/// A request authenticated as an existing consumer.
#[derive(Debug, Clone)]
pub struct AuthConsumer {
    pub consumer_id: Uuid,
}

/// A request authenticated as an existing seller.
#[derive(Debug, Clone)]
pub struct AuthSeller {
    pub seller_id: Uuid,
}

fn bearer_token(parts: &axum::http::request::Parts) -> Result<&str, AppError> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?;

    let auth_str = auth_header.to_str().map_err(|_| AppError::Unauthorized)?;

    auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AppError::Unauthorized)
}

fn decode_claims(token: &str, secret: &str) -> Result<Claims, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized)?;
    Ok(decoded.claims)
}

// A token for the other principal kind is a scope problem (403), a garbled
// subject is a credential problem (401).
fn require_scope(claims: &Claims, expected: Scope) -> Result<Uuid, AppError> {
    if claims.scope != expected {
        return Err(AppError::Forbidden);
    }
    Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)
}

impl<S> FromRequestParts<S> for AuthConsumer
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let claims = decode_claims(bearer_token(parts)?, &state.config.jwt_secret)?;
        let consumer_id = require_scope(&claims, Scope::Consumer)?;

        // The subject may have been removed since the token was issued.
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM consumers WHERE id = $1")
            .bind(consumer_id)
            .fetch_optional(&state.pool)
            .await?;
        if exists.is_none() {
            return Err(AppError::Unauthorized);
        }

        Ok(AuthConsumer { consumer_id })
    }
}

impl<S> FromRequestParts<S> for AuthSeller
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let claims = decode_claims(bearer_token(parts)?, &state.config.jwt_secret)?;
        let seller_id = require_scope(&claims, Scope::Seller)?;

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM sellers WHERE id = $1")
            .bind(seller_id)
            .fetch_optional(&state.pool)
            .await?;
        if exists.is_none() {
            return Err(AppError::Unauthorized);
        }

        Ok(AuthSeller { seller_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn parts_with_auth(value: Option<&str>) -> axum::http::request::Parts {
        let mut builder = Request::builder().uri("/cart");
        if let Some(value) = value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn signed_token(scope: Scope, sub: &str, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            scope,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn bearer_token_requires_the_bearer_prefix() {
        let parts = parts_with_auth(Some("Bearer abc123"));
        assert_eq!(bearer_token(&parts).unwrap(), "abc123");

        let parts = parts_with_auth(Some("Basic abc123"));
        assert!(matches!(bearer_token(&parts), Err(AppError::Unauthorized)));

        let parts = parts_with_auth(None);
        assert!(matches!(bearer_token(&parts), Err(AppError::Unauthorized)));
    }

    #[test]
    fn decode_rejects_a_foreign_signature() {
        let token = signed_token(Scope::Consumer, &Uuid::nil().to_string(), "secret-a");
        assert!(decode_claims(&token, "secret-a").is_ok());
        assert!(matches!(
            decode_claims(&token, "secret-b"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn wrong_scope_reads_as_forbidden() {
        let sub = Uuid::new_v4();
        let token = signed_token(Scope::Seller, &sub.to_string(), "secret");
        let claims = decode_claims(&token, "secret").unwrap();

        assert!(matches!(
            require_scope(&claims, Scope::Consumer),
            Err(AppError::Forbidden)
        ));
        assert_eq!(require_scope(&claims, Scope::Seller).unwrap(), sub);
    }

    #[test]
    fn malformed_subject_reads_as_unauthorized() {
        let claims = Claims {
            sub: "not-a-uuid".into(),
            scope: Scope::Consumer,
            exp: usize::MAX,
        };
        assert!(matches!(
            require_scope(&claims, Scope::Consumer),
            Err(AppError::Unauthorized)
        ));
    }
}
