// Database Interface - document store seam for the `users`, `posts` and `comments` collections,
// plus the credential records behind the identity service

use async_trait::async_trait;

use crate::core::strong_types::{PostId, UserId};
use crate::error::AppResult;
use crate::models::{Comment, FeedCursor, Post, PostChanges, User};

/// Credential record owned by the identity service; never leaves the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub uid: UserId,
    pub email: String,
    pub password_hash: String,
    pub disabled: bool,
    pub failed_attempts: u32,
    pub locked_until_millis: Option<i64>,
    pub created_at_millis: i64,
}

/// Document store operations used by the board services.
///
/// None of the multi-document operations here promise more than the
/// implementation's own transaction guarantees; callers treat every call
/// as a single request that either fails or succeeds once.
#[async_trait]
pub trait DatabaseInterface: Send + Sync {
    async fn health_check(&self) -> AppResult<()>;

    // users
    async fn create_user(&self, user: &User) -> AppResult<()>;
    async fn get_user(&self, id: UserId) -> AppResult<Option<User>>;

    // posts
    async fn create_post(&self, post: &Post) -> AppResult<()>;
    async fn get_post(&self, id: PostId) -> AppResult<Option<Post>>;
    /// Returns false when the post does not exist.
    async fn update_post(
        &self,
        id: PostId,
        changes: &PostChanges,
        updated_at_millis: i64,
    ) -> AppResult<bool>;
    /// Removes the post and every comment pointing at it.
    async fn delete_post(&self, id: PostId) -> AppResult<bool>;
    /// Newest first, ties broken by id descending.
    async fn list_posts(&self, limit: u64, offset: u64) -> AppResult<Vec<Post>>;
    /// Newest first, strictly after `cursor` in that order.
    async fn list_posts_after(&self, cursor: Option<FeedCursor>, limit: u64)
        -> AppResult<Vec<Post>>;
    async fn count_posts(&self) -> AppResult<u64>;

    // denormalized comment counters
    async fn list_comment_counters(&self) -> AppResult<Vec<(PostId, i64)>>;
    /// Conditional write: only succeeds while the stored value is still `expected`.
    async fn set_comment_count_if(&self, id: PostId, expected: i64, value: i64)
        -> AppResult<bool>;

    // comments
    /// Inserts the comment and bumps the parent counter atomically.
    /// Returns false, writing nothing, when the parent post is missing.
    async fn add_comment(&self, comment: &Comment) -> AppResult<bool>;
    /// Oldest first, ties broken by id ascending.
    async fn list_comments(&self, post_id: PostId) -> AppResult<Vec<Comment>>;
    async fn count_comments(&self, post_id: PostId) -> AppResult<i64>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns false when the email is already registered.
    async fn insert_credentials(&self, record: &CredentialRecord) -> AppResult<bool>;
    async fn find_credentials_by_email(&self, email: &str) -> AppResult<Option<CredentialRecord>>;
    async fn find_credentials(&self, uid: UserId) -> AppResult<Option<CredentialRecord>>;
    async fn update_sign_in_state(
        &self,
        uid: UserId,
        failed_attempts: u32,
        locked_until_millis: Option<i64>,
    ) -> AppResult<()>;
    async fn set_disabled(&self, uid: UserId, disabled: bool) -> AppResult<bool>;
    async fn delete_credentials(&self, uid: UserId) -> AppResult<bool>;
}
