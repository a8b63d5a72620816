use axum::extract::{Path, State};
use axum::{Extension, Json};

use chatter_sync::convert_user;
use chatter_types::api::UpdateUserRequest;
use chatter_types::models::User;

use crate::auth::validate_username;
use crate::error::ApiError;
use crate::extract::{ApiJson, parse_id};
use crate::middleware::AuthSession;
use crate::state::{AppState, with_db};

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let id = parse_id(&id)?;
    let user = with_db(&state, move |db| Ok(db.get_user_by_id(id)?))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;
    Ok(Json(convert_user(user)))
}

/// Users may only edit themselves. Attributes are merged key by key.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    let id = parse_id(&id)?;
    if id != auth.user_id {
        return Err(ApiError::Forbidden("users can only update themselves".into()));
    }
    if let Some(username) = &req.username {
        validate_username(username)?;
    }

    let user = with_db(&state, move |db| {
        Ok(db.update_user(id, req.username.as_deref(), req.attributes)?)
    })
    .await?;
    Ok(Json(convert_user(user)))
}
