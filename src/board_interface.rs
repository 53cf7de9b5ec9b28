// Board HTTP interface - JSON routes over the auth, media and post services

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    app_state::AppState,
    core::strong_types::{millis_to_datetime, PostId},
    error::{AppError, AppResult},
    infrastructure::middleware::{MaybeSession, Session},
    models::{decode_base64, Comment, FeedPage, Post, PostPage, PostWithComments, SyncReport, User},
    services::AuthSession,
    validation::{
        CommentForm, LoginForm, PostForm, PostUpdateForm, RegisterForm, MAX_IMAGES_PER_POST,
    },
};

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<AuthSession> for AuthResponse {
    fn from(auth: AuthSession) -> Self {
        Self {
            expires_at: millis_to_datetime(auth.session.expires_at_millis),
            user: auth.user,
            token: auth.token,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub cursor: Option<String>,
    pub limit: Option<u32>,
}

/// Base64-encoded image body
#[derive(Debug, Deserialize)]
pub struct UploadImageRequest {
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadImagesRequest {
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteImageRequest {
    pub url: String,
}

// Auth handlers

pub async fn register_handler(
    State(state): State<AppState>,
    Json(form): Json<RegisterForm>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let registered = state.auth.register(&form).await?;
    Ok((StatusCode::CREATED, Json(registered.into())))
}

pub async fn login_handler(
    State(state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> AppResult<Json<AuthResponse>> {
    let login = state.auth.login(&form).await?;
    Ok(Json(login.into()))
}

pub async fn logout_handler(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<StatusCode> {
    state.auth.logout(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me_handler(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
) -> AppResult<Json<Option<User>>> {
    let user = state.auth.get_current_user(session.as_ref()).await?;
    Ok(Json(user))
}

// Post handlers

pub async fn list_posts_handler(
    State(state): State<AppState>,
    Query(params): Query<PageQuery>,
) -> AppResult<Json<PostPage>> {
    let defaults = state.posts.page_settings();
    let page = state
        .posts
        .get_post_page(
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(defaults.default_page_size),
        )
        .await?;
    Ok(Json(page))
}

pub async fn feed_handler(
    State(state): State<AppState>,
    Query(params): Query<FeedQuery>,
) -> AppResult<Json<FeedPage>> {
    let limit = params
        .limit
        .unwrap_or(state.posts.page_settings().default_page_size);
    let feed = state.posts.get_feed(params.cursor.as_deref(), limit).await?;
    Ok(Json(feed))
}

pub async fn count_posts_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let total = state.posts.get_total_posts_count().await?;
    Ok(Json(json!({ "total": total })))
}

pub async fn create_post_handler(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<PostForm>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let author = state.auth.require_profile(&session).await?;
    let post = state.posts.create_post(&author, &form).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn get_post_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> AppResult<Json<PostWithComments>> {
    let detail = state.posts.get_post_with_comments(PostId::new(id)).await?;
    Ok(Json(detail))
}

pub async fn update_post_handler(
    State(state): State<AppState>,
    session: Session,
    AxumPath(id): AxumPath<i64>,
    Json(form): Json<PostUpdateForm>,
) -> AppResult<Json<Post>> {
    let author = state.auth.require_profile(&session).await?;
    let post = state.posts.update_post(&author, PostId::new(id), &form).await?;
    Ok(Json(post))
}

pub async fn delete_post_handler(
    State(state): State<AppState>,
    session: Session,
    AxumPath(id): AxumPath<i64>,
) -> AppResult<StatusCode> {
    let author = state.auth.require_profile(&session).await?;
    state.posts.delete_post(&author, PostId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_comments_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<i64>,
) -> AppResult<Json<Vec<Comment>>> {
    let comments = state.posts.get_comments(PostId::new(id)).await?;
    Ok(Json(comments))
}

pub async fn add_comment_handler(
    State(state): State<AppState>,
    session: Session,
    AxumPath(id): AxumPath<i64>,
    Json(form): Json<CommentForm>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let author = state.auth.require_profile(&session).await?;
    let comment = state.posts.add_comment(&author, PostId::new(id), &form).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

// Image handlers

pub async fn upload_image_handler(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<UploadImageRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let bytes = decode_base64(&req.data)?;
    let url = state.media.upload_image_bytes(bytes, session.user_id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "url": url }))))
}

pub async fn upload_images_handler(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<UploadImagesRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if req.images.len() > MAX_IMAGES_PER_POST {
        return Err(AppError::Validation(
            "이미지는 최대 3개까지만 업로드할 수 있습니다.".to_string(),
        ));
    }
    let images = req
        .images
        .iter()
        .map(|data| decode_base64(data))
        .collect::<AppResult<Vec<_>>>()?;
    let urls = state
        .media
        .upload_multiple_image_bytes(images, session.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "urls": urls }))))
}

pub async fn delete_image_handler(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<DeleteImageRequest>,
) -> AppResult<StatusCode> {
    if !state.media.owns_image(&req.url, session.user_id) {
        return Err(AppError::Forbidden("본인이 올린 이미지만 삭제할 수 있습니다.".to_string()));
    }
    state.media.delete_image(&req.url).await;
    Ok(StatusCode::NO_CONTENT)
}

// Maintenance

pub async fn sync_comment_counts_handler(
    State(state): State<AppState>,
    _session: Session,
) -> AppResult<Json<SyncReport>> {
    let report = state.posts.sync_comment_counts().await?;
    Ok(Json(report))
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.database.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

/// Routes mounted under `/api/v1`
pub fn create_board_router() -> Router<AppState> {
    Router::new()
        // Auth
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/me", get(me_handler))
        // Posts
        .route("/posts", get(list_posts_handler).post(create_post_handler))
        .route("/posts/feed", get(feed_handler))
        .route("/posts/count", get(count_posts_handler))
        .route(
            "/posts/{id}",
            get(get_post_handler)
                .patch(update_post_handler)
                .delete(delete_post_handler),
        )
        .route(
            "/posts/{id}/comments",
            get(list_comments_handler).post(add_comment_handler),
        )
        // Images
        .route(
            "/images",
            post(upload_image_handler).delete(delete_image_handler),
        )
        .route("/images/batch", post(upload_images_handler))
        // Maintenance
        .route(
            "/maintenance/sync-comment-counts",
            post(sync_comment_counts_handler),
        )
}

/// Full application: API, uploaded media and health check.
pub fn build_app(state: AppState) -> Router {
    let media_root = state.config.storage.root.clone();
    Router::new()
        .nest("/api/v1", create_board_router())
        .route("/health", get(health_handler))
        .nest_service("/media", ServeDir::new(media_root))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
