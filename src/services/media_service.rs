// Media Access - image picking behind a device seam, blob uploads and best-effort deletes

use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::core::strong_types::{current_time_millis, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::blob_storage::BlobStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    Gallery,
    Camera,
}

impl MediaSource {
    fn permission_denied_message(self) -> &'static str {
        match self {
            MediaSource::Gallery => "갤러리 접근 권한이 필요합니다.",
            MediaSource::Camera => "카메라 접근 권한이 필요합니다.",
        }
    }
}

/// Options handed to the picker for every launch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickerOptions {
    pub allows_editing: bool,
    /// Crop aspect as width:height
    pub aspect: (u32, u32),
    pub quality: f32,
}

impl Default for PickerOptions {
    fn default() -> Self {
        Self {
            allows_editing: true,
            aspect: (4, 3),
            quality: 0.8,
        }
    }
}

/// Device image picker: permission prompt plus gallery or camera UI.
#[async_trait]
pub trait MediaPicker: Send + Sync {
    async fn request_permission(&self, source: MediaSource) -> AppResult<bool>;
    /// Local URI of the chosen image, `None` when the user cancelled.
    async fn launch(&self, source: MediaSource, options: PickerOptions)
        -> AppResult<Option<String>>;
}

pub struct MediaService {
    storage: Arc<dyn BlobStorage>,
    options: PickerOptions,
}

impl MediaService {
    pub fn new(storage: Arc<dyn BlobStorage>) -> Self {
        Self {
            storage,
            options: PickerOptions::default(),
        }
    }

    pub fn picker_options(&self) -> PickerOptions {
        self.options
    }

    pub async fn pick_image(&self, picker: &dyn MediaPicker) -> AppResult<Option<String>> {
        self.pick(picker, MediaSource::Gallery).await
    }

    pub async fn take_photo(&self, picker: &dyn MediaPicker) -> AppResult<Option<String>> {
        self.pick(picker, MediaSource::Camera).await
    }

    async fn pick(
        &self,
        picker: &dyn MediaPicker,
        source: MediaSource,
    ) -> AppResult<Option<String>> {
        if !picker.request_permission(source).await? {
            return Err(AppError::Forbidden(
                source.permission_denied_message().to_string(),
            ));
        }
        let picked = picker.launch(source, self.options).await?;
        if picked.is_none() {
            debug!("{:?} picker cancelled", source);
        }
        Ok(picked)
    }

    /// Reads a local image (plain path or `file://` URI) and uploads it.
    #[instrument(skip(self))]
    pub async fn upload_image(&self, uri: &str, user_id: UserId) -> AppResult<String> {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read {}: {}", uri, e)))?;
        self.upload_image_bytes(bytes, user_id).await
    }

    pub async fn upload_image_bytes(&self, bytes: Vec<u8>, user_id: UserId) -> AppResult<String> {
        let path = object_path_for(user_id);
        self.storage.upload(&path, &bytes).await?;
        let url = self.storage.download_url(&path).await?;
        info!("Uploaded image {} for user {}", path, user_id);
        Ok(url)
    }

    /// All-or-nothing: the first failure rejects the batch. URLs keep the input order.
    pub async fn upload_multiple_images(
        &self,
        uris: &[String],
        user_id: UserId,
    ) -> AppResult<Vec<String>> {
        try_join_all(uris.iter().map(|uri| self.upload_image(uri, user_id))).await
    }

    pub async fn upload_multiple_image_bytes(
        &self,
        images: Vec<Vec<u8>>,
        user_id: UserId,
    ) -> AppResult<Vec<String>> {
        try_join_all(
            images
                .into_iter()
                .map(|bytes| self.upload_image_bytes(bytes, user_id)),
        )
        .await
    }

    /// True when `url` resolves to an object under the user's own `images/{uid}/` prefix.
    pub fn owns_image(&self, url: &str, user_id: UserId) -> bool {
        let prefix = format!("images/{}/", user_id);
        match self.storage.object_path(url) {
            Ok(path) => {
                matches!(path.strip_prefix(prefix.as_str()), Some(rest) if !rest.is_empty())
            }
            Err(_) => false,
        }
    }

    /// Best-effort: failures are logged and swallowed.
    pub async fn delete_image(&self, url: &str) {
        match self.storage.delete(url).await {
            Ok(true) => debug!("Deleted image {}", url),
            Ok(false) => debug!("Image {} was already gone", url),
            Err(e) => warn!("Failed to delete image {}: {}", url, e),
        }
    }
}

/// `images/{uid}/{millis}-{suffix}.jpg`; the suffix keeps uploads in the same millisecond apart.
fn object_path_for(user_id: UserId) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "images/{}/{}-{}.jpg",
        user_id,
        current_time_millis(),
        &suffix[..8]
    )
}
