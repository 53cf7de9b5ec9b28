use base64::Engine;
use serde::{Deserialize, Serialize};

use super::Post;
use crate::core::strong_types::PostId;
use crate::error::{AppError, AppResult};

/// Number of page buttons shown around the current page
pub const PAGE_WINDOW: u32 = 5;

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32, max_page_size: u32) -> AppResult<Self> {
        if page == 0 {
            return Err(AppError::Validation("page starts at 1".to_string()));
        }
        if page_size == 0 || page_size > max_page_size {
            return Err(AppError::Validation(format!(
                "page_size must be between 1 and {}",
                max_page_size
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub has_prev: bool,
    pub has_next: bool,
    /// 1-based index of the first item on this page, 0 when the page is empty
    pub first_item: u64,
    pub last_item: u64,
    /// Page numbers for the pagination controls
    pub window: Vec<u32>,
}

impl PageInfo {
    pub fn new(request: PageRequest, total_items: u64) -> Self {
        let size = u64::from(request.page_size);
        let total_pages = total_items.div_ceil(size).max(1) as u32;
        let page = request.page;

        let first_item = if request.offset() < total_items {
            request.offset() + 1
        } else {
            0
        };
        let last_item = if first_item == 0 {
            0
        } else {
            (u64::from(page) * size).min(total_items)
        };

        let start = page.saturating_sub(2).max(1);
        let window = (start..start + PAGE_WINDOW)
            .take_while(|p| *p <= total_pages)
            .collect();

        Self {
            page,
            page_size: request.page_size,
            total_items,
            total_pages,
            has_prev: page > 1,
            has_next: page < total_pages,
            first_item,
            last_item,
            window,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub page_info: PageInfo,
}

/// Keyset position in the newest-first feed: the last post already seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCursor {
    pub created_at_millis: i64,
    pub post_id: PostId,
}

impl FeedCursor {
    pub fn after(post: &Post) -> Self {
        Self {
            created_at_millis: post.created_at.timestamp_millis(),
            post_id: post.id,
        }
    }

    pub fn encode(&self) -> String {
        let raw = format!("{}:{}", self.created_at_millis, self.post_id);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw)
    }

    pub fn decode(token: &str) -> AppResult<Self> {
        let invalid = || AppError::BadRequest("Invalid feed cursor".to_string());
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| invalid())?;
        let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
        let (millis, id) = raw.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            created_at_millis: millis.parse().map_err(|_| invalid())?,
            post_id: id.parse().map_err(|_| invalid())?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub next_cursor: Option<String>,
}
