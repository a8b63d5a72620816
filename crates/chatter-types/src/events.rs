use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::id::Id;
use crate::models::Attributes;

/// Every kind of room event. Only the `message_*` kinds may be written by
/// clients; the rest are produced by the server itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UpdateRoom,
    MemberJoin,
    MemberLeave,
    MessageCreate,
    MessageUpdate,
    MessageDelete,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpdateRoom => "update_room",
            Self::MemberJoin => "member_join",
            Self::MemberLeave => "member_leave",
            Self::MessageCreate => "message_create",
            Self::MessageUpdate => "message_update",
            Self::MessageDelete => "message_delete",
        }
    }

    pub fn is_client_writable(&self) -> bool {
        matches!(
            self,
            Self::MessageCreate | Self::MessageUpdate | Self::MessageDelete
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload, tagged by `type` with the schema-specific body under
/// `content`. This is also the body of `POST /rooms/{id}/events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum EventContent {
    UpdateRoom(RoomUpdate),
    MemberJoin(Membership),
    MemberLeave(Membership),
    MessageCreate(MessageBody),
    MessageUpdate(MessageEdit),
    MessageDelete(MessageRef),
}

impl EventContent {
    pub fn kind(&self) -> EventType {
        match self {
            Self::UpdateRoom(_) => EventType::UpdateRoom,
            Self::MemberJoin(_) => EventType::MemberJoin,
            Self::MemberLeave(_) => EventType::MemberLeave,
            Self::MessageCreate(_) => EventType::MessageCreate,
            Self::MessageUpdate(_) => EventType::MessageUpdate,
            Self::MessageDelete(_) => EventType::MessageDelete,
        }
    }

    /// The bare `content` object, as stored next to the type column.
    pub fn body(&self) -> serde_json::Result<Value> {
        let mut tagged = serde_json::to_value(self)?;
        Ok(tagged
            .get_mut("content")
            .map(Value::take)
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// Reassemble from a stored type column and content object.
    pub fn from_parts(kind: &str, body: Value) -> serde_json::Result<Self> {
        serde_json::from_value(json!({ "type": kind, "content": body }))
    }
}

/// `update_room`: the fields that changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
}

/// `member_join` / `member_leave`: the author is the member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Membership {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    /// Embeds and other client-defined keys, kept verbatim.
    #[serde(flatten)]
    pub extra: Attributes,
}

/// `message_update`: `id` names the `message_create` event being edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEdit {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(flatten)]
    pub extra: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: Id,
}
