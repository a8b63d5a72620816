use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::EventContent;
use crate::id::Id;

/// Open, loosely-typed key/value bag carried by users and rooms.
pub type Attributes = Map<String, Value>;

/// Shallow merge: keys in `patch` overwrite, everything else is kept.
pub fn merge_attributes(base: &mut Attributes, patch: Attributes) {
    for (key, value) in patch {
        base.insert(key, value);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub username: String,
    #[serde(default)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Id,
    pub name: String,
    pub owner: User,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// The calling user plus the rooms they belong to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Me {
    #[serde(flatten)]
    pub user: User,
    #[serde(rename = "ownsRooms")]
    pub owns_rooms: Vec<Room>,
    #[serde(rename = "joinedRooms")]
    pub joined_rooms: Vec<Room>,
}

/// A room event as clients see it. `content` flattens into `type` + `content`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: Id,
    #[serde(rename = "roomID")]
    pub room_id: Id,
    pub author: User,
    #[serde(flatten)]
    pub content: EventContent,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MessageBody;
    use serde_json::json;

    #[test]
    fn merge_overwrites_and_keeps() {
        let mut base = json!({"color": "#ff0000", "topic": "old"})
            .as_object()
            .cloned()
            .unwrap();
        let patch = json!({"topic": "new", "avatar": null})
            .as_object()
            .cloned()
            .unwrap();

        merge_attributes(&mut base, patch);

        assert_eq!(
            Value::Object(base),
            json!({"color": "#ff0000", "topic": "new", "avatar": null})
        );
    }

    #[test]
    fn event_wire_shape() {
        let author = User {
            id: Id::from_i64(7),
            username: "alice".into(),
            attributes: Attributes::new(),
        };
        let event = Event {
            id: Id::from_i64(99),
            room_id: Id::from_i64(5),
            author,
            content: EventContent::MessageCreate(MessageBody {
                markdown: Some("hi".into()),
                extra: Attributes::new(),
            }),
            created_at: Id::from_i64(99).created_at(),
        };

        let v = serde_json::to_value(&event).unwrap();
        assert_eq!(v["id"], "99");
        assert_eq!(v["roomID"], "5");
        assert_eq!(v["type"], "message_create");
        assert_eq!(v["content"], json!({"markdown": "hi"}));
        assert_eq!(v["author"]["username"], "alice");
    }
}
