// Sample data for local development: a handful of users, posts and comments

use tracing::info;

use crate::{
    app_state::AppState,
    error::AppResult,
    validation::{CommentForm, PostForm, RegisterForm},
};

pub const SEED_PASSWORD: &str = "board123!";

#[derive(Debug, Clone, Copy)]
pub struct SeedOptions {
    pub users: usize,
    pub posts_per_user: usize,
    pub comments_per_post: usize,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            users: 3,
            posts_per_user: 4,
            comments_per_post: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub posts: usize,
    pub comments: usize,
}

/// Registers `seed{n}@example.com` users through the normal service paths, so every
/// record passes validation and comment counters stay in step.
pub async fn seed_board(state: &AppState, options: SeedOptions) -> AppResult<SeedSummary> {
    let mut summary = SeedSummary::default();
    let mut authors = Vec::with_capacity(options.users);

    for n in 1..=options.users {
        let registered = state
            .auth
            .register(&RegisterForm {
                email: format!("seed{}@example.com", n),
                password: SEED_PASSWORD.to_string(),
                confirm_password: SEED_PASSWORD.to_string(),
                display_name: Some(format!("게시판 사용자 {}", n)),
            })
            .await?;
        authors.push(registered.user);
        summary.users += 1;
    }

    for (index, author) in authors.iter().enumerate() {
        for p in 1..=options.posts_per_user {
            let post = state
                .posts
                .create_post(
                    author,
                    &PostForm {
                        title: format!("{}의 글 #{}", author.display_name, p),
                        content: format!(
                            "샘플 게시글 본문입니다. 작성자 {}, 글 번호 {}.",
                            author.display_name, p
                        ),
                        images: Vec::new(),
                    },
                )
                .await?;
            summary.posts += 1;

            for c in 0..options.comments_per_post {
                let commenter = &authors[(index + c + 1) % authors.len()];
                state
                    .posts
                    .add_comment(
                        commenter,
                        post.id,
                        &CommentForm {
                            content: format!("댓글 {} 남깁니다", c + 1),
                        },
                    )
                    .await?;
                summary.comments += 1;
            }
        }
    }

    info!(
        "Seeded {} users, {} posts, {} comments",
        summary.users, summary.posts, summary.comments
    );
    Ok(summary)
}
