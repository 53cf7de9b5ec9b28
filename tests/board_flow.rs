use std::sync::Arc;

use community_board::{
    app_state::AppState,
    config::Config,
    core::PostId,
    error::AppError,
    infrastructure::{DatabaseInterface, IdentityErrorCode, SqliteDatabase},
    models::{Post, User},
    validation::{CommentForm, LoginForm, PostForm, RegisterForm},
};

struct Board {
    state: AppState,
    db: Arc<SqliteDatabase>,
    _dir: tempfile::TempDir,
}

async fn in_memory_board() -> Board {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
    let state = AppState::with_database(Config::local(dir.path()), db.clone());
    Board { state, db, _dir: dir }
}

async fn file_board(max_connections: u32) -> Board {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("board.db").display());
    let db = Arc::new(SqliteDatabase::connect(&url, max_connections).await.unwrap());
    let state = AppState::with_database(Config::local(dir.path()), db.clone());
    Board { state, db, _dir: dir }
}

async fn register(board: &Board, email: &str) -> User {
    board
        .state
        .auth
        .register(&RegisterForm {
            email: email.to_string(),
            password: "secret12!".to_string(),
            confirm_password: "secret12!".to_string(),
            display_name: None,
        })
        .await
        .unwrap()
        .user
}

async fn write_post(board: &Board, author: &User, n: usize) -> Post {
    board
        .state
        .posts
        .create_post(
            author,
            &PostForm {
                title: format!("Post {}", n),
                content: format!("Body of post number {}", n),
                images: Vec::new(),
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_registration_shares_uid_with_profile() {
    let board = in_memory_board().await;
    let user = register(&board, "Mixed.Case@Example.com").await;

    assert_eq!(user.email, "mixed.case@example.com");
    assert!(board.state.identity.identity_exists(user.id).await.unwrap());
    assert_eq!(board.db.get_user(user.id).await.unwrap(), Some(user.clone()));

    let login = board
        .state
        .auth
        .login(&LoginForm {
            email: "mixed.case@example.com".to_string(),
            password: "secret12!".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(login.session.user_id, user.id);
    assert_eq!(login.user, user);
}

#[tokio::test]
async fn test_wrong_password_and_unknown_email() {
    let board = in_memory_board().await;
    register(&board, "lee@example.com").await;

    let attempt = |email: &str, password: &str| LoginForm {
        email: email.to_string(),
        password: password.to_string(),
    };
    match board.state.auth.login(&attempt("lee@example.com", "nope1234!")).await {
        Err(AppError::Identity(code)) => assert_eq!(code, IdentityErrorCode::WrongPassword),
        other => panic!("unexpected: {:?}", other.map(|s| s.user)),
    }
    match board.state.auth.login(&attempt("who@example.com", "nope1234!")).await {
        Err(AppError::Identity(code)) => assert_eq!(code, IdentityErrorCode::UserNotFound),
        other => panic!("unexpected: {:?}", other.map(|s| s.user)),
    }
}

#[tokio::test]
async fn test_pages_concatenate_without_overlap_or_gap() {
    let board = in_memory_board().await;
    let author = register(&board, "writer@example.com").await;
    for n in 0..23 {
        write_post(&board, &author, n).await;
    }

    let everything = board.state.posts.get_posts(1, 100).await.unwrap();
    assert_eq!(everything.len(), 23);
    for pair in everything.windows(2) {
        assert!((pair[0].created_at, pair[0].id) > (pair[1].created_at, pair[1].id));
    }

    let mut paged = Vec::new();
    for page in 1..=5 {
        let posts = board.state.posts.get_posts(page, 5).await.unwrap();
        assert!(posts.len() <= 5);
        paged.extend(posts);
    }
    assert_eq!(paged, everything);
    assert!(board.state.posts.get_posts(6, 5).await.unwrap().is_empty());

    let last = board.state.posts.get_post_page(5, 5).await.unwrap();
    assert_eq!(last.posts.len(), 3);
    assert_eq!(last.page_info.total_items, 23);
    assert_eq!(last.page_info.total_pages, 5);
    assert!(!last.page_info.has_next);
    assert_eq!(last.page_info.first_item, 21);
    assert_eq!(last.page_info.last_item, 23);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_comments_lose_no_increments() {
    let board = file_board(4).await;
    let author = register(&board, "host@example.com").await;
    let post = write_post(&board, &author, 1).await;

    let posts = board.state.posts.clone();
    let post_id = post.id;
    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let posts = posts.clone();
            let author = author.clone();
            tokio::spawn(async move {
                posts
                    .add_comment(
                        &author,
                        post_id,
                        &CommentForm {
                            content: format!("comment {}", i),
                        },
                    )
                    .await
            })
        })
        .collect();
    for task in futures::future::join_all(tasks).await {
        task.unwrap().unwrap();
    }

    let detail = board.state.posts.get_post_with_comments(post.id).await.unwrap();
    assert_eq!(detail.post.comment_count, 20);
    assert_eq!(detail.comments.len(), 20);
    for pair in detail.comments.windows(2) {
        assert!((pair[0].created_at, pair[0].id) < (pair[1].created_at, pair[1].id));
    }
}

#[tokio::test]
async fn test_sync_repairs_drift_and_is_idempotent() {
    let board = in_memory_board().await;
    let author = register(&board, "sync@example.com").await;
    let first = write_post(&board, &author, 1).await;
    let second = write_post(&board, &author, 2).await;
    for text in ["a", "b"] {
        board
            .state
            .posts
            .add_comment(&author, first.id, &CommentForm { content: text.to_string() })
            .await
            .unwrap();
    }

    sqlx::query("UPDATE posts SET comment_count = 9 WHERE id = ?")
        .bind(second.id.value())
        .execute(board.db.pool())
        .await
        .unwrap();

    let report = board.state.posts.sync_comment_counts().await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.corrected.len(), 1);
    assert_eq!(report.corrected[0].post_id, second.id);
    assert_eq!(report.corrected[0].actual, 0);
    assert!(report.conflicts.is_empty());

    let again = board.state.posts.sync_comment_counts().await.unwrap();
    assert!(again.is_clean());
    assert_eq!(again.scanned, 2);

    let mut counts = Vec::new();
    for id in [first.id, second.id] {
        counts.push(board.db.get_post(id).await.unwrap().unwrap().comment_count);
    }
    assert_eq!(counts, vec![2, 0]);
}

#[tokio::test]
async fn test_invalid_comment_never_reaches_store() {
    let board = in_memory_board().await;
    let author = register(&board, "short@example.com").await;
    let post = write_post(&board, &author, 1).await;

    for content in ["   ".to_string(), "x".repeat(51)] {
        let result = board
            .state
            .posts
            .add_comment(&author, post.id, &CommentForm { content })
            .await;
        assert!(matches!(result, Err(AppError::InvalidForm(_))));
    }
    assert_eq!(board.db.count_comments(post.id).await.unwrap(), 0);

    let missing = board
        .state
        .posts
        .add_comment(&author, PostId::new(1), &CommentForm { content: "hi".to_string() })
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_delete_post_removes_comments_and_images() {
    let board = in_memory_board().await;
    let author = register(&board, "pics@example.com").await;
    let url = board
        .state
        .media
        .upload_image_bytes(b"jpeg".to_vec(), author.id)
        .await
        .unwrap();

    let post = board
        .state
        .posts
        .create_post(
            &author,
            &PostForm {
                title: "With image".to_string(),
                content: "A post that carries an image".to_string(),
                images: vec![url.clone()],
            },
        )
        .await
        .unwrap();
    board
        .state
        .posts
        .add_comment(&author, post.id, &CommentForm { content: "nice".to_string() })
        .await
        .unwrap();

    board.state.posts.delete_post(&author, post.id).await.unwrap();
    assert_eq!(board.state.posts.get_post(post.id).await.unwrap(), None);
    assert_eq!(board.db.count_comments(post.id).await.unwrap(), 0);

    let object = url.trim_start_matches("http://localhost:3000/media/");
    let stored = std::path::Path::new(&board.state.config.storage.root).join(object);
    assert!(!stored.exists());
}
