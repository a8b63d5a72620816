//! Projection of stored rows into the wire shapes clients see.

use chatter_db::models::{EventRow, RoomRow, UserRow};
use chatter_types::Id;
use chatter_types::events::EventContent;
use chatter_types::models::{Event, Room, User};
use thiserror::Error;

/// Rows that disagree with each other. Always an internal inconsistency,
/// never something a client caused.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("event {event} has author {claimed} but was paired with user {actual}")]
    AuthorMismatch { event: Id, claimed: Id, actual: Id },

    #[error("room {room} has owner {claimed} but was paired with user {actual}")]
    OwnerMismatch { room: Id, claimed: Id, actual: Id },

    #[error("event {event} has unreadable {kind} content: {source}")]
    Content {
        event: Id,
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

pub fn convert_user(user: UserRow) -> User {
    User {
        id: user.id,
        username: user.username,
        attributes: user.attributes,
    }
}

pub fn convert_room(room: RoomRow, owner: UserRow) -> Result<Room, ConvertError> {
    if room.owner_id != owner.id {
        return Err(ConvertError::OwnerMismatch {
            room: room.id,
            claimed: room.owner_id,
            actual: owner.id,
        });
    }

    Ok(Room {
        id: room.id,
        name: room.name,
        owner: convert_user(owner),
        attributes: room.attributes,
        created_at: room.id.created_at(),
    })
}

pub fn convert_event(event: EventRow, author: UserRow) -> Result<Event, ConvertError> {
    if event.author_id != author.id {
        return Err(ConvertError::AuthorMismatch {
            event: event.id,
            claimed: event.author_id,
            actual: author.id,
        });
    }

    let content = EventContent::from_parts(&event.kind, event.content).map_err(|source| {
        ConvertError::Content {
            event: event.id,
            kind: event.kind.clone(),
            source,
        }
    })?;

    Ok(Event {
        id: event.id,
        room_id: event.room_id,
        author: convert_user(author),
        content,
        created_at: event.id.created_at(),
    })
}
