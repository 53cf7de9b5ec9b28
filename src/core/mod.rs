// Core types shared across layers

pub mod strong_types;

pub use strong_types::{current_time_millis, millis_to_datetime, CommentId, PostId, UserId};
