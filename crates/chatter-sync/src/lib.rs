//! Incremental sync: given a user and the watermark from their last sync,
//! compute the new watermark and the per-room events since the old one.

pub mod convert;
pub mod engine;

pub use convert::{ConvertError, convert_event, convert_room, convert_user};
pub use engine::{SYNC_EVENT_LIMIT, SyncError, parse_watermark, sync};
