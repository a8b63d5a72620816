use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use tracing::debug;

use chatter_sync::convert_event;
use chatter_types::api::RoomEventsQuery;
use chatter_types::events::EventContent;
use chatter_types::models::Event;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery, page_limit, parse_id};
use crate::middleware::AuthSession;
use crate::state::{AppState, with_db};

const MAX_HISTORY_PAGE: u32 = 100;

/// Room history, newest first. Reading a room joins the caller to it.
pub async fn list_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<String>,
    ApiQuery(q): ApiQuery<RoomEventsQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let room_id = parse_id(&id)?;
    let limit = page_limit(q.limit, MAX_HISTORY_PAGE);

    let events = with_db(&state, move |db| {
        db.ensure_member(room_id, auth.user_id)?;
        let events = db
            .query_by_room(room_id, q.before, limit)?
            .into_iter()
            .map(|(event, author)| convert_event(event, author))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    })
    .await?;
    Ok(Json(events))
}

/// Post a client event. Only message types may be written; the rest are
/// produced by the server as side effects of room and membership changes.
pub async fn send_event(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(id): Path<String>,
    ApiJson(content): ApiJson<EventContent>,
) -> Result<impl IntoResponse, ApiError> {
    let room_id = parse_id(&id)?;
    let kind = content.kind();
    if !kind.is_client_writable() {
        return Err(ApiError::BadRequest(format!(
            "event type {} cannot be sent by clients",
            kind
        )));
    }

    let user_id = auth.user_id;
    let event = with_db(&state, move |db| {
        db.ensure_member(room_id, user_id)?;
        let row = db.append_event(room_id, user_id, &content)?;
        let author = db
            .get_user_by_id(user_id)?
            .ok_or_else(|| ApiError::Internal(format!("author {} vanished", user_id)))?;
        Ok(convert_event(row, author)?)
    })
    .await?;

    debug!("User {} posted {} {} in room {}", user_id, kind, event.id, room_id);
    Ok((StatusCode::CREATED, Json(event)))
}
