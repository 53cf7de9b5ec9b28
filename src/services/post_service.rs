// Content Access - posts, comments, pagination and comment counter reconciliation

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::core::strong_types::{current_time_millis, millis_to_datetime, CommentId, PostId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::id_generator::DocumentIdGenerator;
use crate::models::{
    Comment, CountCorrection, FeedCursor, FeedPage, PageInfo, PageRequest, Post, PostChanges,
    PostPage, PostWithComments, SyncReport, User,
};
use crate::services::media_service::MediaService;
use crate::validation::{CommentForm, PostForm, PostUpdateForm};

/// Concurrent comment counts issued by one reconciliation pass
const SYNC_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct PageSettings {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

pub struct PostService {
    db: Arc<dyn DatabaseInterface>,
    ids: Arc<DocumentIdGenerator>,
    media: Arc<MediaService>,
    pages: PageSettings,
}

fn post_not_found() -> AppError {
    AppError::NotFound("게시글을 찾을 수 없습니다.".to_string())
}

impl PostService {
    pub fn new(
        db: Arc<dyn DatabaseInterface>,
        ids: Arc<DocumentIdGenerator>,
        media: Arc<MediaService>,
        pages: PageSettings,
    ) -> Self {
        Self {
            db,
            ids,
            media,
            pages,
        }
    }

    pub fn page_settings(&self) -> PageSettings {
        self.pages
    }

    #[instrument(skip(self, author, form), fields(author = %author.id))]
    pub async fn create_post(&self, author: &User, form: &PostForm) -> AppResult<Post> {
        form.validate()?;

        let now = millis_to_datetime(current_time_millis());
        let post = Post {
            id: PostId::new(self.ids.next_id()),
            title: form.title.clone(),
            content: form.content.clone(),
            images: form.images.clone(),
            author_id: author.id,
            author_name: author.display_name.clone(),
            created_at: now,
            updated_at: now,
            likes: 0,
            comment_count: 0,
        };
        self.db.create_post(&post).await?;
        info!("Created post {}", post.id);
        Ok(post)
    }

    /// Newest first; a short page means the end was reached.
    pub async fn get_posts(&self, page: u32, page_size: u32) -> AppResult<Vec<Post>> {
        let request = PageRequest::new(page, page_size, self.pages.max_page_size)?;
        self.db.list_posts(request.limit(), request.offset()).await
    }

    pub async fn get_total_posts_count(&self) -> AppResult<u64> {
        self.db.count_posts().await
    }

    pub async fn get_post_page(&self, page: u32, page_size: u32) -> AppResult<PostPage> {
        let request = PageRequest::new(page, page_size, self.pages.max_page_size)?;
        let (posts, total) = tokio::try_join!(
            self.db.list_posts(request.limit(), request.offset()),
            self.db.count_posts()
        )?;
        Ok(PostPage {
            posts,
            page_info: PageInfo::new(request, total),
        })
    }

    /// Keyset page after `cursor`. `next_cursor` is `None` on the last page.
    pub async fn get_feed(&self, cursor: Option<&str>, limit: u32) -> AppResult<FeedPage> {
        if limit == 0 || limit > self.pages.max_page_size {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                self.pages.max_page_size
            )));
        }
        let after = cursor.map(FeedCursor::decode).transpose()?;

        let mut posts = self
            .db
            .list_posts_after(after, u64::from(limit) + 1)
            .await?;
        let has_more = posts.len() > limit as usize;
        posts.truncate(limit as usize);

        let next_cursor = if has_more {
            posts.last().map(|post| FeedCursor::after(post).encode())
        } else {
            None
        };
        Ok(FeedPage { posts, next_cursor })
    }

    pub async fn get_post(&self, id: PostId) -> AppResult<Option<Post>> {
        self.db.get_post(id).await
    }

    pub async fn get_post_with_comments(&self, id: PostId) -> AppResult<PostWithComments> {
        let (post, comments) = tokio::try_join!(self.db.get_post(id), self.db.list_comments(id))?;
        let post = post.ok_or_else(post_not_found)?;
        Ok(PostWithComments { post, comments })
    }

    async fn owned_post(&self, author: &User, id: PostId) -> AppResult<Post> {
        let post = self.db.get_post(id).await?.ok_or_else(post_not_found)?;
        if post.author_id != author.id {
            warn!("User {} tried to modify post {} owned by {}", author.id, id, post.author_id);
            return Err(AppError::Forbidden("작성자만 수정할 수 있습니다.".to_string()));
        }
        Ok(post)
    }

    /// Partial update by the author; an empty update returns the post unchanged.
    #[instrument(skip(self, author, form), fields(author = %author.id))]
    pub async fn update_post(
        &self,
        author: &User,
        id: PostId,
        form: &PostUpdateForm,
    ) -> AppResult<Post> {
        form.validate()?;
        let post = self.owned_post(author, id).await?;
        if form.is_empty() {
            return Ok(post);
        }

        let changes = PostChanges {
            title: form.title.clone(),
            content: form.content.clone(),
            images: form.images.clone(),
        };
        if !self.db.update_post(id, &changes, current_time_millis()).await? {
            return Err(post_not_found());
        }
        self.db.get_post(id).await?.ok_or_else(post_not_found)
    }

    /// Removes the post with its comments, then its images on a best-effort basis.
    #[instrument(skip(self, author), fields(author = %author.id))]
    pub async fn delete_post(&self, author: &User, id: PostId) -> AppResult<()> {
        let post = self.owned_post(author, id).await?;
        if !self.db.delete_post(id).await? {
            return Err(post_not_found());
        }
        for url in &post.images {
            self.media.delete_image(url).await;
        }
        info!("Deleted post {} ({} images)", id, post.images.len());
        Ok(())
    }

    /// Writes the comment and bumps the post's counter in one transaction.
    #[instrument(skip(self, author, form), fields(author = %author.id))]
    pub async fn add_comment(
        &self,
        author: &User,
        post_id: PostId,
        form: &CommentForm,
    ) -> AppResult<Comment> {
        let content = form.validate()?;

        let now = millis_to_datetime(current_time_millis());
        let comment = Comment {
            id: CommentId::new(self.ids.next_id()),
            post_id,
            author_id: author.id,
            author_name: author.display_name.clone(),
            content,
            created_at: now,
            updated_at: now,
        };
        if !self.db.add_comment(&comment).await? {
            return Err(post_not_found());
        }
        Ok(comment)
    }

    pub async fn get_comments(&self, post_id: PostId) -> AppResult<Vec<Comment>> {
        self.db.list_comments(post_id).await
    }

    /// Recounts comments per post and rewrites drifted counters with a conditional write.
    /// A counter that moved since it was read is reported as a conflict and left alone.
    #[instrument(skip(self))]
    pub async fn sync_comment_counts(&self) -> AppResult<SyncReport> {
        let counters = self.db.list_comment_counters().await?;
        let scanned = counters.len();

        let drifted: Vec<CountCorrection> = stream::iter(counters)
            .map(|(post_id, stored)| async move {
                let actual = self.db.count_comments(post_id).await?;
                Ok::<_, AppError>(CountCorrection {
                    post_id,
                    stored,
                    actual,
                })
            })
            .buffer_unordered(SYNC_CONCURRENCY)
            .try_filter(|c| futures::future::ready(c.stored != c.actual))
            .try_collect()
            .await?;

        let mut report = SyncReport {
            scanned,
            ..SyncReport::default()
        };
        for correction in drifted {
            if self
                .db
                .set_comment_count_if(correction.post_id, correction.stored, correction.actual)
                .await?
            {
                report.corrected.push(correction);
            } else {
                report.conflicts.push(correction.post_id);
            }
        }
        report.corrected.sort_by_key(|c| c.post_id);
        report.conflicts.sort();

        info!(
            "Comment count sync: scanned={} corrected={} conflicts={}",
            report.scanned,
            report.corrected.len(),
            report.conflicts.len()
        );
        Ok(report)
    }
}
