// Seeds the configured database with sample users, posts and comments.
// Usage: seed_board [users] [posts_per_user] [comments_per_post]

use tracing_subscriber::EnvFilter;

use community_board::{
    app_state::AppState,
    config::Config,
    data_seeder::{seed_board, SeedOptions, SEED_PASSWORD},
};

fn arg_or(args: &[String], index: usize, default: usize) -> anyhow::Result<usize> {
    match args.get(index) {
        Some(value) => value
            .parse()
            .map_err(|_| anyhow::anyhow!("argument {} must be a number, got {:?}", index, value)),
        None => Ok(default),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("community_board=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let defaults = SeedOptions::default();
    let options = SeedOptions {
        users: arg_or(&args, 0, defaults.users)?,
        posts_per_user: arg_or(&args, 1, defaults.posts_per_user)?,
        comments_per_post: arg_or(&args, 2, defaults.comments_per_post)?,
    };

    let config = Config::from_env()?;
    println!("Seeding {} with {:?}", config.database.url, options);
    let state = AppState::new(config).await?;

    let summary = seed_board(&state, options).await?;
    println!(
        "Created {} users, {} posts, {} comments",
        summary.users, summary.posts, summary.comments
    );
    println!("Sign in as seed1@example.com / {}", SEED_PASSWORD);
    Ok(())
}
