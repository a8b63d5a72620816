use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use tracing::info;

use chatter_db::models::SessionRow;
use chatter_types::api::{LoginRequest, RegisterRequest, SessionResponse};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::AuthSession;
use crate::state::{AppState, with_db};

const MAX_PASSWORD_BYTES: usize = 72;
const MIN_PASSWORD_BYTES: usize = 8;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_username(&req.username)?;
    if req.password.len() < MIN_PASSWORD_BYTES || req.password.len() > MAX_PASSWORD_BYTES {
        return Err(ApiError::BadRequest(format!(
            "password must be {}-{} bytes",
            MIN_PASSWORD_BYTES, MAX_PASSWORD_BYTES
        )));
    }

    let max_age = state.session_max_age;
    let session = with_db(&state, move |db| {
        let password_hash = hash_password(&req.password)?;
        let user = db.create_user(&req.username, &password_hash)?;
        Ok(db.create_session(user.id, max_age)?)
    })
    .await?;

    info!("Registered user {}", session.user_id);
    Ok((StatusCode::CREATED, Json(session_response(session))))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let max_age = state.session_max_age;
    let session = with_db(&state, move |db| {
        let user = db
            .get_user_by_username(&req.username)?
            .ok_or(ApiError::Unauthorized("invalid username or password"))?;

        let parsed = PasswordHash::new(&user.password)
            .map_err(|e| ApiError::Internal(format!("stored hash for {}: {}", user.id, e)))?;
        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed)
            .map_err(|_| ApiError::Unauthorized("invalid username or password"))?;

        Ok(db.create_session(user.id, max_age)?)
    })
    .await?;

    Ok(Json(session_response(session)))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
) -> Result<StatusCode, ApiError> {
    with_db(&state, move |db| Ok(db.delete_session(&auth.token)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn validate_username(username: &str) -> Result<(), ApiError> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) || username.trim() != username {
        return Err(ApiError::BadRequest(
            "username must be 3-32 characters without surrounding whitespace".into(),
        ));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("hashing password: {}", e)))
}

fn session_response(session: SessionRow) -> SessionResponse {
    SessionResponse {
        id: session.id,
        token: session.token,
        user_id: session.user_id,
        expires_at: session.expires_at,
    }
}
