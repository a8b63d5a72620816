use axum::extract::State;
use axum::{Extension, Json};

use chatter_sync::{parse_watermark, sync};
use chatter_types::api::{SyncQuery, SyncResponse};

use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::middleware::AuthSession;
use crate::state::{AppState, with_db};

/// `GET /sync?lastAck=`: everything the caller has not seen yet.
pub async fn get_sync(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    ApiQuery(q): ApiQuery<SyncQuery>,
) -> Result<Json<SyncResponse>, ApiError> {
    let last_ack = parse_watermark(q.last_ack.as_deref())?;
    let response = with_db(&state, move |db| Ok(sync(db, auth.user_id, last_ack)?)).await?;
    Ok(Json(response))
}
