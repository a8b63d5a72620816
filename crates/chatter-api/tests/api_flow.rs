use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use chatter_api::{AppStateInner, router};
use chatter_db::Database;

struct TestApp {
    _dir: TempDir,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("api.db")).unwrap();
        let state = Arc::new(AppStateInner {
            db,
            session_max_age: chrono::Duration::hours(1),
        });
        Self {
            _dir: dir,
            router: router(state),
        }
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, token);
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(&self, username: &str) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/register",
                None,
                Some(json!({"username": username, "password": "password123"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    async fn create_room(&self, token: &str, name: &str) -> String {
        let (status, body) = self
            .call("POST", "/rooms", Some(token), Some(json!({"name": name})))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }
}

/// Let the clock pass the millisecond of the last write so the next sync's
/// watermark covers it.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(2)).await;
}

fn room_ids(rooms: &Value) -> Vec<&str> {
    rooms
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn register_create_message_delete_flow() {
    let app = TestApp::new();
    app.register("tester bester").await;

    let (status, login) = app
        .call(
            "POST",
            "/login",
            None,
            Some(json!({"username": "tester bester", "password": "password123"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = format!("Bearer {}", login["token"].as_str().unwrap());
    let token = token.as_str();

    let room_id = app.create_room(token, "test room").await;
    settle().await;

    // Initial sync: the room is owned and joined, and holds only the owner's join.
    let (status, first) = app.call("GET", "/sync", Some(token), None).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["me"]["username"], "tester bester");
    assert_eq!(room_ids(&first["me"]["ownsRooms"]), vec![room_id.as_str()]);
    assert_eq!(room_ids(&first["me"]["joinedRooms"]), vec![room_id.as_str()]);
    assert_eq!(first["me"]["ownsRooms"][0]["owner"]["username"], "tester bester");
    let initial = first["events"][&room_id].as_array().unwrap();
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0]["type"], "member_join");
    let ack = first["ack"].as_str().unwrap().to_string();

    let (status, sent) = app
        .call(
            "POST",
            &format!("/rooms/{}/events", room_id),
            Some(token),
            Some(json!({"type": "message_create", "content": {"markdown": "hello world"}})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{sent}");
    assert_eq!(sent["roomID"], room_id.as_str());
    settle().await;

    let (_, second) = app
        .call("GET", &format!("/sync?lastAck={}", ack), Some(token), None)
        .await;
    let delta = second["events"][&room_id].as_array().unwrap();
    assert_eq!(delta.len(), 1);
    assert_eq!(delta[0]["id"], sent["id"]);
    assert_eq!(delta[0]["type"], "message_create");
    assert_eq!(delta[0]["content"], json!({"markdown": "hello world"}));
    assert_eq!(delta[0]["author"]["username"], "tester bester");
    let ack = second["ack"].as_str().unwrap().to_string();

    let (_, quiet) = app
        .call("GET", &format!("/sync?lastAck={}", ack), Some(token), None)
        .await;
    assert!(quiet["events"][&room_id].as_array().unwrap().is_empty());

    let (status, _) = app
        .call("DELETE", &format!("/rooms/{}", room_id), Some(token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    settle().await;

    let (_, after) = app
        .call("GET", &format!("/sync?lastAck={}", ack), Some(token), None)
        .await;
    assert!(after["me"]["ownsRooms"].as_array().unwrap().is_empty());
    assert!(after["me"]["joinedRooms"].as_array().unwrap().is_empty());
    assert!(after["events"].get(&room_id).is_none());
}

#[tokio::test]
async fn sync_requires_a_session() {
    let app = TestApp::new();

    let (status, body) = app.call("GET", "/sync", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = app.call("GET", "/sync", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_ack_is_bad_request() {
    let app = TestApp::new();
    let token = app.register("alice").await;

    let (status, body) = app
        .call("GET", "/sync?lastAck=yesterday", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("lastAck"));
}

#[tokio::test]
async fn clients_cannot_forge_system_events() {
    let app = TestApp::new();
    let token = app.register("alice").await;
    let room_id = app.create_room(&token, "lobby").await;
    let uri = format!("/rooms/{}/events", room_id);

    let (status, _) = app
        .call(
            "POST",
            &uri,
            Some(&token),
            Some(json!({"type": "member_join", "content": {}})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            "POST",
            &uri,
            Some(&token),
            Some(json!({"type": "message_teleport", "content": {}})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, history) = app.call("GET", &uri, Some(&token), None).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["type"], "member_join");
}

#[tokio::test]
async fn membership_rules() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room_id = app.create_room(&alice, "lobby").await;
    let join = format!("/rooms/{}/join", room_id);

    let (status, body) = app.call("DELETE", &join, Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    let (status, _) = app.call("POST", &join, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call("POST", &join, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.call("DELETE", &join, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call("DELETE", &join, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, history) = app
        .call("GET", &format!("/rooms/{}/events", room_id), Some(&alice), None)
        .await;
    let kinds: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["member_leave", "member_join", "member_join"]);

    let (status, _) = app
        .call(
            "PATCH",
            &format!("/rooms/{}", room_id),
            Some(&bob),
            Some(json!({"name": "bob's room"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call("POST", "/rooms/123/join", Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reading_history_joins_the_reader() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let room_id = app.create_room(&alice, "lobby").await;

    let (status, _) = app
        .call("GET", &format!("/rooms/{}/events", room_id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    settle().await;

    let (_, sync) = app.call("GET", "/sync", Some(&bob), None).await;
    assert_eq!(room_ids(&sync["me"]["joinedRooms"]), vec![room_id.as_str()]);
    assert!(sync["me"]["ownsRooms"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn accounts_and_sessions() {
    let app = TestApp::new();
    let token = app.register("alice").await;

    let (status, _) = app
        .call(
            "POST",
            "/register",
            None,
            Some(json!({"username": "alice", "password": "password456"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(
            "POST",
            "/register",
            None,
            Some(json!({"username": "carol", "password": "short"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            "POST",
            "/login",
            None,
            Some(json!({"username": "alice", "password": "wrong-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call("POST", "/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call("GET", "/sync", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn users_edit_only_themselves() {
    let app = TestApp::new();
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let (_, me) = app.call("GET", "/sync", Some(&alice), None).await;
    let alice_id = me["me"]["id"].as_str().unwrap().to_string();
    let uri = format!("/users/{}", alice_id);

    let (status, _) = app
        .call("PATCH", &uri, Some(&bob), Some(json!({"username": "mallory"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call("PATCH", &uri, Some(&alice), Some(json!({"username": "bob"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(
            "PATCH",
            &uri,
            Some(&alice),
            Some(json!({"attributes": {"color": "#ff0000"}})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, user) = app
        .call("PATCH", &uri, Some(&alice), Some(json!({"attributes": {"bio": "hi"}})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["attributes"], json!({"color": "#ff0000", "bio": "hi"}));

    let (status, fetched) = app.call("GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["username"], "alice");
    assert!(fetched.get("password").is_none());
}

#[tokio::test]
async fn room_listing_pages() {
    let app = TestApp::new();
    let token = app.register("alice").await;
    for name in ["rust", "cooking", "rustaceans"] {
        app.create_room(&token, name).await;
    }

    let (status, page) = app.call("GET", "/rooms?limit=2", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["rooms"].as_array().unwrap().len(), 2);
    assert_eq!(page["hasMore"], true);
    assert_eq!(page["rooms"][0]["name"], "rustaceans");

    let cursor = page["rooms"][1]["id"].as_str().unwrap();
    let (_, rest) = app
        .call("GET", &format!("/rooms?limit=2&before={}", cursor), Some(&token), None)
        .await;
    assert_eq!(rest["rooms"].as_array().unwrap().len(), 1);
    assert_eq!(rest["rooms"][0]["name"], "rust");

    let (_, found) = app.call("GET", "/rooms?query=RUST", Some(&token), None).await;
    assert_eq!(found["rooms"].as_array().unwrap().len(), 2);
    assert_eq!(found["hasMore"], false);

    let (status, _) = app.call("GET", "/rooms?limit=lots", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
