use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use chatter_db::rooms::RoomFilter;
use chatter_sync::convert_room;
use chatter_types::api::{CreateRoomRequest, ListRoomsQuery, ListRoomsResponse, UpdateRoomRequest};
use chatter_types::models::Room;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery, page_limit, parse_id};
use crate::middleware::AuthSession;
use crate::state::{AppState, with_db};

const MAX_ROOM_PAGE: u32 = 100;
const MAX_ROOM_NAME_CHARS: usize = 100;

pub async fn list_rooms(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<ListRoomsQuery>,
) -> Result<Json<ListRoomsResponse>, ApiError> {
    let filter = RoomFilter {
        query: q.query.filter(|s| !s.is_empty()),
        owner_id: q.owner_id,
        before: q.before,
        limit: page_limit(q.limit, MAX_ROOM_PAGE),
    };

    let response = with_db(&state, move |db| {
        let rooms = db
            .list_rooms(&filter)?
            .into_iter()
            .map(|(room, owner)| convert_room(room, owner))
            .collect::<Result<Vec<_>, _>>()?;
        let has_more = rooms.len() == filter.limit as usize;
        Ok(ListRoomsResponse { rooms, has_more })
    })
    .await?;
    Ok(Json(response))
}

pub async fn create_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    ApiJson(req): ApiJson<CreateRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_name(&req.name)?;

    let room = with_db(&state, move |db| {
        let created = db.create_room(auth.user_id, &name, req.attributes)?;
        load_room(db, created.id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Room>, ApiError> {
    let id = parse_id(&id)?;
    let room = with_db(&state, move |db| load_room(db, id)).await?;
    Ok(Json(room))
}

pub async fn update_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateRoomRequest>,
) -> Result<Json<Room>, ApiError> {
    let id = parse_id(&id)?;
    let name = req.name.as_deref().map(validate_name).transpose()?;

    let room = with_db(&state, move |db| {
        db.update_room(id, auth.user_id, name.as_deref(), req.attributes)?;
        load_room(db, id)
    })
    .await?;
    Ok(Json(room))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    with_db(&state, move |db| Ok(db.delete_room(id, auth.user_id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn join_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    with_db(&state, move |db| Ok(db.ensure_member(id, auth.user_id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Owners cannot leave their own room; they delete it instead.
pub async fn leave_room(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    with_db(&state, move |db| Ok(db.leave_room(id, auth.user_id)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn load_room(db: &chatter_db::Database, id: chatter_types::Id) -> Result<Room, ApiError> {
    let (room, owner) = db
        .get_room(id)?
        .ok_or_else(|| ApiError::NotFound("room not found".into()))?;
    Ok(convert_room(room, owner)?)
}

fn validate_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_ROOM_NAME_CHARS {
        return Err(ApiError::BadRequest(format!(
            "room name must be 1-{} characters",
            MAX_ROOM_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}
