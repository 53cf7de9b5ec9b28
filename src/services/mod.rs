// Board services - session/user, media and content access

pub mod auth_service;
pub mod comment_count_reconciler;
pub mod media_service;
pub mod post_service;
pub mod session_sweeper;

pub use auth_service::{AuthService, AuthSession};
pub use comment_count_reconciler::spawn_comment_count_reconciler;
pub use media_service::{MediaPicker, MediaService, MediaSource, PickerOptions};
pub use post_service::{PageSettings, PostService};
pub use session_sweeper::spawn_session_sweeper;
