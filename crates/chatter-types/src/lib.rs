pub mod api;
pub mod events;
pub mod id;
pub mod models;

pub use id::{Id, IdGenerator};
