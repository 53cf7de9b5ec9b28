// Community Board Server

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use community_board::{
    app_state::AppState, board_interface::build_app, config::Config,
    services::{spawn_comment_count_reconciler, spawn_session_sweeper},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("community_board=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let app_state = AppState::new(config.clone()).await?;

    let reconciler = config
        .reconcile_interval()
        .map(|period| spawn_comment_count_reconciler(app_state.posts.clone(), period));
    let sweeper = config
        .session_sweep_interval()
        .map(|period| spawn_session_sweeper(app_state.identity.clone(), period));

    let app = build_app(app_state);

    let addr = config.server_address();
    let listener = TcpListener::bind(&addr).await?;
    info!("Community board listening on http://{}", addr);
    info!("  API    /api/v1 (auth, posts, comments, images, maintenance)");
    info!("  Media  /media -> {}", config.storage.root);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    for handle in [reconciler, sweeper].into_iter().flatten() {
        handle.abort();
    }
    Ok(())
}
