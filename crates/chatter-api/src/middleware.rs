use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;

use chatter_types::Id;

use crate::error::ApiError;
use crate::state::{AppState, with_db};

/// The caller's session, inserted into request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Id,
    pub token: String,
}

/// Resolve the `Authorization` header to a live session. Accepts both a bare
/// token and `Bearer <token>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let raw = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized("missing session token"))?;

    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim().to_string();
    if token.is_empty() {
        return Err(ApiError::Unauthorized("missing session token"));
    }

    let max_age = state.session_max_age;
    let session = with_db(&state, move |db| {
        Ok(db.authorize(&token, max_age, Utc::now())?)
    })
    .await?
    .ok_or(ApiError::Unauthorized("invalid or expired session"))?;

    req.extensions_mut().insert(AuthSession {
        user_id: session.user_id,
        token: session.token,
    });
    Ok(next.run(req).await)
}
