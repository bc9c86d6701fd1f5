use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::auth::{
        ConsumerLoginResponse, LoginRequest, RegisterRequest, SellerLoginResponse,
        UpdateProfileRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthConsumer, Claims, Scope},
    models::{Consumer, Seller},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn register_consumer(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<Consumer>> {
    let (name, email) = normalize_identity(&payload)?;
    let password_hash = hash_password(&payload.password)?;

    let exist: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM consumers WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    // The pre-check above can race a concurrent registration; the unique
    // index on email is the arbiter.
    let consumer: Consumer = sqlx::query_as(
        "INSERT INTO consumers (id, name, email, password_hash) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(&email)
    .bind(password_hash)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| AppError::from_unique_violation(e, "Email is already registered"))?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(consumer.id),
        "consumer_register",
        Some("consumers"),
        Some(serde_json::json!({ "consumer_id": consumer.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Consumer created", consumer, None))
}

pub async fn login_consumer(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<ConsumerLoginResponse>> {
    let email = payload.email.trim().to_lowercase();
    let consumer: Option<Consumer> = sqlx::query_as("SELECT * FROM consumers WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;

    let consumer = consumer.ok_or(AppError::Unauthorized)?;
    verify_password(&payload.password, &consumer.password_hash)?;

    let token = issue_token(state, consumer.id, Scope::Consumer)?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(consumer.id),
        "consumer_login",
        Some("consumers"),
        Some(serde_json::json!({ "consumer_id": consumer.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Logged in",
        ConsumerLoginResponse { token, consumer },
        Some(Meta::empty()),
    ))
}

pub async fn register_seller(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<Seller>> {
    let (name, email) = normalize_identity(&payload)?;
    let password_hash = hash_password(&payload.password)?;

    let exist: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM sellers WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    let seller: Seller = sqlx::query_as(
        "INSERT INTO sellers (id, name, email, password_hash) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(&email)
    .bind(password_hash)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| AppError::from_unique_violation(e, "Email is already registered"))?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(seller.id),
        "seller_register",
        Some("sellers"),
        Some(serde_json::json!({ "seller_id": seller.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Seller created", seller, None))
}

pub async fn login_seller(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<SellerLoginResponse>> {
    let email = payload.email.trim().to_lowercase();
    let seller: Option<Seller> = sqlx::query_as("SELECT * FROM sellers WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;

    let seller = seller.ok_or(AppError::Unauthorized)?;
    verify_password(&payload.password, &seller.password_hash)?;

    let token = issue_token(state, seller.id, Scope::Seller)?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(seller.id),
        "seller_login",
        Some("sellers"),
        Some(serde_json::json!({ "seller_id": seller.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Logged in",
        SellerLoginResponse { token, seller },
        Some(Meta::empty()),
    ))
}

pub async fn get_profile(
    state: &AppState,
    consumer: &AuthConsumer,
) -> AppResult<ApiResponse<Consumer>> {
    let row: Option<Consumer> = sqlx::query_as("SELECT * FROM consumers WHERE id = $1")
        .bind(consumer.consumer_id)
        .fetch_optional(&state.pool)
        .await?;

    let row = row.ok_or(AppError::Unauthorized)?;
    Ok(ApiResponse::success("Profile", row, None))
}

pub async fn update_profile(
    state: &AppState,
    consumer: &AuthConsumer,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<Consumer>> {
    let (name, email) = normalize_profile_patch(&payload)?;

    if let Some(email) = email.as_deref() {
        let taken: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM consumers WHERE email = $1 AND id <> $2")
                .bind(email)
                .bind(consumer.consumer_id)
                .fetch_optional(&state.pool)
                .await?;
        if taken.is_some() {
            return Err(AppError::Conflict("Email is already registered".into()));
        }
    }

    let updated: Consumer = sqlx::query_as(
        r#"
        UPDATE consumers
        SET name = COALESCE($2, name), email = COALESCE($3, email)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(consumer.consumer_id)
    .bind(name)
    .bind(email)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| AppError::from_unique_violation(e, "Email is already registered"))?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(updated.id),
        "consumer_profile_update",
        Some("consumers"),
        Some(serde_json::json!({ "consumer_id": updated.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Profile updated", updated, None))
}

// Patch fields are optional but must not be blank when present; emails get
// the same lowercasing as registration.
fn normalize_profile_patch(
    payload: &UpdateProfileRequest,
) -> Result<(Option<String>, Option<String>), AppError> {
    let name = payload.name.as_deref().map(|n| n.trim().to_string());
    let email = payload.email.as_deref().map(|e| e.trim().to_lowercase());
    if name.as_deref() == Some("") || email.as_deref() == Some("") {
        return Err(AppError::BadRequest(
            "name and email must not be blank".into(),
        ));
    }
    Ok((name, email))
}

// Emails are compared case-insensitively; store them lowercased.
fn normalize_identity(payload: &RegisterRequest) -> Result<(String, String), AppError> {
    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest(
            "name, email and password are required".into(),
        ));
    }
    Ok((name, email))
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, stored_hash: &str) -> Result<(), AppError> {
    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized)
}

fn issue_token(state: &AppState, subject: Uuid, scope: Scope) -> Result<String, AppError> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(state.config.token_ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: subject.to_string(),
        scope,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}
