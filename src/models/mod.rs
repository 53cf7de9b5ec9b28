// Board records - users, posts and comments as stored in the document store

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::strong_types::{CommentId, PostId, UserId};
use crate::error::{AppError, AppResult};

pub mod pagination;

pub use pagination::{FeedCursor, FeedPage, PageInfo, PageRequest, PostPage};

/// Profile document in the `users` collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Document in the `posts` collection.
///
/// `author_name` is copied from the profile at creation and never refreshed.
/// `likes` is stored but nothing increments it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub author_id: UserId,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub likes: i64,
    pub comment_count: i64,
}

/// Document in the `comments` collection; immutable once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post detail view: the post and its comments fetched together
#[derive(Debug, Clone, Serialize)]
pub struct PostWithComments {
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// Changes applied by a partial post update
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub images: Option<Vec<String>>,
}

/// One counter rewritten by the reconciliation routine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountCorrection {
    pub post_id: PostId,
    pub stored: i64,
    pub actual: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub scanned: usize,
    pub corrected: Vec<CountCorrection>,
    /// Posts whose counter moved between the read and the conditional write
    pub conflicts: Vec<PostId>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.corrected.is_empty() && self.conflicts.is_empty()
    }
}

pub(crate) fn decode_base64(data: &str) -> AppResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| AppError::BadRequest(format!("Invalid base64 payload: {}", e)))
}
