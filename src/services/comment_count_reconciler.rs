// Periodic comment counter reconciliation

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::services::post_service::PostService;

/// Runs `sync_comment_counts` every `period`; the first pass happens one period after start.
pub fn spawn_comment_count_reconciler(posts: Arc<PostService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!("Comment count reconciler running every {:?}", period);
        loop {
            ticker.tick().await;
            match posts.sync_comment_counts().await {
                Ok(report) if report.is_clean() => {}
                Ok(report) => {
                    for correction in &report.corrected {
                        info!(
                            "Post {} comment count {} -> {}",
                            correction.post_id, correction.stored, correction.actual
                        );
                    }
                    if !report.conflicts.is_empty() {
                        warn!("Comment count changed during sync for {:?}", report.conflicts);
                    }
                }
                Err(e) => error!("Comment count sync failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::strong_types::{PostId, UserId};
    use crate::infrastructure::blob_storage::LocalBlobStorage;
    use crate::infrastructure::database::DatabaseInterface;
    use crate::infrastructure::id_generator::DocumentIdGenerator;
    use crate::infrastructure::sqlite_database::SqliteDatabase;
    use crate::models::Post;
    use crate::services::media_service::MediaService;
    use crate::services::post_service::PageSettings;
    use chrono::Utc;

    #[tokio::test]
    async fn test_reconciler_fixes_counter_on_tick() {
        let blobs = tempfile::tempdir().unwrap();
        let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        let media = Arc::new(MediaService::new(Arc::new(LocalBlobStorage::new(
            blobs.path(),
            "http://localhost/media",
        ))));
        let posts = Arc::new(PostService::new(
            db.clone(),
            Arc::new(DocumentIdGenerator::new(3)),
            media,
            PageSettings::default(),
        ));

        let now = Utc::now();
        db.create_post(&Post {
            id: PostId::new(1),
            title: "Drifted".to_string(),
            content: "0123456789".to_string(),
            images: Vec::new(),
            author_id: UserId::new(1),
            author_name: "kim".to_string(),
            created_at: now,
            updated_at: now,
            likes: 0,
            comment_count: 4,
        })
        .await
        .unwrap();

        let handle = spawn_comment_count_reconciler(posts, Duration::from_millis(20));
        let mut fixed = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if db.get_post(PostId::new(1)).await.unwrap().unwrap().comment_count == 0 {
                fixed = true;
                break;
            }
        }
        handle.abort();
        assert!(fixed);
    }
}
