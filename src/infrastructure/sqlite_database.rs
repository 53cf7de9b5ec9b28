use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::str::FromStr;
use tracing::{debug, info};

use crate::core::strong_types::{millis_to_datetime, CommentId, PostId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{CredentialRecord, CredentialStore, DatabaseInterface};
use crate::models::{Comment, FeedCursor, Post, PostChanges, User};

const POST_COLUMNS: &str = concat!(
    "id, title, content, images, author_id, author_name, ",
    "created_at, updated_at, likes, comment_count"
);
const COMMENT_COLUMNS: &str =
    "id, post_id, author_id, author_name, content, created_at, updated_at";
const CREDENTIAL_COLUMNS: &str =
    "uid, email, password_hash, disabled, failed_attempts, locked_until, created_at";

fn db_err(context: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(format!("{}: {}", context, e))
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// SQLite document store. Collections map to tables; timestamps are Unix milliseconds.
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                let msg = format!("Invalid database url {}: {}", database_url, e);
                AppError::ConfigurationError(msg)
            })?
            .create_if_missing(true);

        let connected = if is_memory_url(database_url) {
            // Every pooled connection to :memory: would open its own database
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            let filename = options.clone().get_filename();
            if let Some(parent) = filename.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        AppError::ConfigurationError(format!(
                            "Failed to create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await
        };
        let pool = connected.map_err(db_err("Failed to connect to SQLite"))?;

        let db = Self { pool };
        db.initialize().await?;
        info!("Document store ready at {}", database_url);
        Ok(db)
    }

    pub async fn new_in_memory() -> AppResult<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the collection tables and their query indexes.
    pub async fn initialize(&self) -> AppResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL,
                display_name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                uid INTEGER PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                disabled INTEGER NOT NULL DEFAULT 0,
                failed_attempts INTEGER NOT NULL DEFAULT 0,
                locked_until INTEGER,
                created_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                images TEXT NOT NULL DEFAULT '[]',
                author_id INTEGER NOT NULL,
                author_name TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                likes INTEGER NOT NULL DEFAULT 0,
                comment_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY,
                post_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                author_name TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC, id DESC)",
            "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at, id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err("Failed to initialize schema"))?;
        }
        debug!("Document store schema initialized");
        Ok(())
    }
}

fn row_to_user(row: &SqliteRow) -> User {
    User {
        id: UserId(row.get("id")),
        email: row.get("email"),
        display_name: row.get("display_name"),
        created_at: millis_to_datetime(row.get("created_at")),
        updated_at: millis_to_datetime(row.get("updated_at")),
    }
}

fn row_to_post(row: &SqliteRow) -> AppResult<Post> {
    let images: String = row.get("images");
    let images: Vec<String> = serde_json::from_str(&images).map_err(|e| {
        AppError::DatabaseError(format!("Corrupt images column on post: {}", e))
    })?;
    Ok(Post {
        id: PostId(row.get("id")),
        title: row.get("title"),
        content: row.get("content"),
        images,
        author_id: UserId(row.get("author_id")),
        author_name: row.get("author_name"),
        created_at: millis_to_datetime(row.get("created_at")),
        updated_at: millis_to_datetime(row.get("updated_at")),
        likes: row.get("likes"),
        comment_count: row.get("comment_count"),
    })
}

fn row_to_comment(row: &SqliteRow) -> Comment {
    Comment {
        id: CommentId(row.get("id")),
        post_id: PostId(row.get("post_id")),
        author_id: UserId(row.get("author_id")),
        author_name: row.get("author_name"),
        content: row.get("content"),
        created_at: millis_to_datetime(row.get("created_at")),
        updated_at: millis_to_datetime(row.get("updated_at")),
    }
}

fn row_to_credentials(row: &SqliteRow) -> CredentialRecord {
    CredentialRecord {
        uid: UserId(row.get("uid")),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        disabled: row.get("disabled"),
        failed_attempts: row.get::<i64, _>("failed_attempts").max(0) as u32,
        locked_until_millis: row.get("locked_until"),
        created_at_millis: row.get("created_at"),
    }
}

fn encode_images(images: &[String]) -> AppResult<String> {
    serde_json::to_string(images)
        .map_err(|e| AppError::Internal(format!("Failed to encode image list: {}", e)))
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl DatabaseInterface for SqliteDatabase {
    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err("Database health check failed"))?;
        Ok(())
    }

    async fn create_user(&self, user: &User) -> AppResult<()> {
        sqlx::query(concat!(
            "INSERT INTO users (id, email, display_name, created_at, updated_at) ",
            "VALUES (?, ?, ?, ?, ?)"
        ))
        .bind(user.id.value())
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(user.created_at.timestamp_millis())
        .bind(user.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to create user profile"))?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> AppResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, email, display_name, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to get user profile"))?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn create_post(&self, post: &Post) -> AppResult<()> {
        sqlx::query(&format!(
            "INSERT INTO posts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            POST_COLUMNS
        ))
        .bind(post.id.value())
        .bind(&post.title)
        .bind(&post.content)
        .bind(encode_images(&post.images)?)
        .bind(post.author_id.value())
        .bind(&post.author_name)
        .bind(post.created_at.timestamp_millis())
        .bind(post.updated_at.timestamp_millis())
        .bind(post.likes)
        .bind(post.comment_count)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to create post"))?;
        Ok(())
    }

    async fn get_post(&self, id: PostId) -> AppResult<Option<Post>> {
        let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to get post"))?;
        row.as_ref().map(row_to_post).transpose()
    }

    async fn update_post(
        &self,
        id: PostId,
        changes: &PostChanges,
        updated_at_millis: i64,
    ) -> AppResult<bool> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE posts SET updated_at = ");
        qb.push_bind(updated_at_millis);
        if let Some(title) = &changes.title {
            qb.push(", title = ");
            qb.push_bind(title.clone());
        }
        if let Some(content) = &changes.content {
            qb.push(", content = ");
            qb.push_bind(content.clone());
        }
        if let Some(images) = &changes.images {
            qb.push(", images = ");
            qb.push_bind(encode_images(images)?);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id.value());

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to update post"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_post(&self, id: PostId) -> AppResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let deleted = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id.value())
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to delete post"))?
            .rows_affected();

        let comments = sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(id.value())
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to delete post comments"))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;

        debug!("Deleted post {} with {} comments", id, comments);
        Ok(deleted > 0)
    }

    async fn list_posts(&self, limit: u64, offset: u64) -> AppResult<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM posts ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            POST_COLUMNS
        ))
        .bind(to_sql_count(limit))
        .bind(to_sql_count(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list posts"))?;
        rows.iter().map(row_to_post).collect()
    }

    async fn list_posts_after(
        &self,
        cursor: Option<FeedCursor>,
        limit: u64,
    ) -> AppResult<Vec<Post>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM posts", POST_COLUMNS));
        if let Some(cursor) = cursor {
            qb.push(" WHERE created_at < ");
            qb.push_bind(cursor.created_at_millis);
            qb.push(" OR (created_at = ");
            qb.push_bind(cursor.created_at_millis);
            qb.push(" AND id < ");
            qb.push_bind(cursor.post_id.value());
            qb.push(")");
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(to_sql_count(limit));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to list feed"))?;
        rows.iter().map(row_to_post).collect()
    }

    async fn count_posts(&self) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to count posts"))?;
        Ok(count.max(0) as u64)
    }

    async fn list_comment_counters(&self) -> AppResult<Vec<(PostId, i64)>> {
        let rows = sqlx::query("SELECT id, comment_count FROM posts ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to list comment counters"))?;
        Ok(rows
            .iter()
            .map(|row| (PostId(row.get("id")), row.get("comment_count")))
            .collect())
    }

    async fn set_comment_count_if(&self, id: PostId, expected: i64, value: i64) -> AppResult<bool> {
        let result =
            sqlx::query("UPDATE posts SET comment_count = ? WHERE id = ? AND comment_count = ?")
                .bind(value)
                .bind(id.value())
                .bind(expected)
                .execute(&self.pool)
                .await
                .map_err(db_err("Failed to write comment counter"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_comment(&self, comment: &Comment) -> AppResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        // Increment first so the transaction takes the write lock up front
        let bumped = sqlx::query("UPDATE posts SET comment_count = comment_count + 1 WHERE id = ?")
            .bind(comment.post_id.value())
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to increment comment counter"))?
            .rows_affected();

        if bumped == 0 {
            tx.rollback()
                .await
                .map_err(db_err("Failed to rollback transaction"))?;
            return Ok(false);
        }

        sqlx::query(&format!(
            "INSERT INTO comments ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            COMMENT_COLUMNS
        ))
        .bind(comment.id.value())
        .bind(comment.post_id.value())
        .bind(comment.author_id.value())
        .bind(&comment.author_name)
        .bind(&comment.content)
        .bind(comment.created_at.timestamp_millis())
        .bind(comment.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to insert comment"))?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;
        Ok(true)
    }

    async fn list_comments(&self, post_id: PostId) -> AppResult<Vec<Comment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM comments WHERE post_id = ? ORDER BY created_at ASC, id ASC",
            COMMENT_COLUMNS
        ))
        .bind(post_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list comments"))?;
        Ok(rows.iter().map(row_to_comment).collect())
    }

    async fn count_comments(&self, post_id: PostId) -> AppResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = ?")
            .bind(post_id.value())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to count comments"))
    }
}

#[async_trait]
impl CredentialStore for SqliteDatabase {
    async fn insert_credentials(&self, record: &CredentialRecord) -> AppResult<bool> {
        let result = sqlx::query(&format!(
            "INSERT INTO credentials ({}) VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(email) DO NOTHING",
            CREDENTIAL_COLUMNS
        ))
        .bind(record.uid.value())
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(record.disabled)
        .bind(i64::from(record.failed_attempts))
        .bind(record.locked_until_millis)
        .bind(record.created_at_millis)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to insert credentials"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_credentials_by_email(&self, email: &str) -> AppResult<Option<CredentialRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM credentials WHERE email = ?",
            CREDENTIAL_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to look up credentials"))?;
        Ok(row.as_ref().map(row_to_credentials))
    }

    async fn find_credentials(&self, uid: UserId) -> AppResult<Option<CredentialRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM credentials WHERE uid = ?",
            CREDENTIAL_COLUMNS
        ))
        .bind(uid.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to look up credentials"))?;
        Ok(row.as_ref().map(row_to_credentials))
    }

    async fn update_sign_in_state(
        &self,
        uid: UserId,
        failed_attempts: u32,
        locked_until_millis: Option<i64>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE credentials SET failed_attempts = ?, locked_until = ? WHERE uid = ?")
            .bind(i64::from(failed_attempts))
            .bind(locked_until_millis)
            .bind(uid.value())
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to update sign-in state"))?;
        Ok(())
    }

    async fn set_disabled(&self, uid: UserId, disabled: bool) -> AppResult<bool> {
        let result = sqlx::query("UPDATE credentials SET disabled = ? WHERE uid = ?")
            .bind(disabled)
            .bind(uid.value())
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to update account state"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_credentials(&self, uid: UserId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE uid = ?")
            .bind(uid.value())
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to delete credentials"))?;
        Ok(result.rows_affected() > 0)
    }
}
