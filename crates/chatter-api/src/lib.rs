pub mod auth;
pub mod error;
pub mod events;
pub mod extract;
pub mod middleware;
pub mod rooms;
pub mod state;
pub mod sync;
pub mod users;

use axum::Router;
use axum::routing::{get, post};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Every HTTP route. Everything but `/register` and `/login` needs a session.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/users/{id}", get(users::get_user).patch(users::update_user))
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route(
            "/rooms/{id}",
            get(rooms::get_room)
                .patch(rooms::update_room)
                .delete(rooms::delete_room),
        )
        .route(
            "/rooms/{id}/join",
            post(rooms::join_room).delete(rooms::leave_room),
        )
        .route(
            "/rooms/{id}/events",
            get(events::list_events).post(events::send_event),
        )
        .route("/sync", get(sync::get_sync))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
