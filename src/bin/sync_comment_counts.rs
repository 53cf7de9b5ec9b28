// One-shot comment counter reconciliation against the configured database.

use tracing_subscriber::EnvFilter;

use community_board::{app_state::AppState, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("community_board=info")),
        )
        .init();

    let config = Config::from_env()?;
    let state = AppState::new(config).await?;

    let report = state.posts.sync_comment_counts().await?;
    println!("Scanned {} posts", report.scanned);
    for correction in &report.corrected {
        println!(
            "  post {}: {} -> {}",
            correction.post_id, correction.stored, correction.actual
        );
    }
    if !report.conflicts.is_empty() {
        println!("Skipped {} posts that changed during the scan:", report.conflicts.len());
        for post_id in &report.conflicts {
            println!("  post {}", post_id);
        }
    }
    if report.is_clean() {
        println!("All comment counts are consistent");
    }
    Ok(())
}
