//! API handlers.

pub mod clips;
pub mod credits;
pub mod health;

pub use clips::{cancel_clip, enqueue_clip, get_clip_status, list_clips, retry_clip};
pub use credits::get_credits;
pub use health::{health, ready};
