// Periodic cleanup of expired sessions and closed sign-in rate windows

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::infrastructure::identity::IdentityService;

/// Sweeps the identity service every `period`, starting one period after spawn.
pub fn spawn_session_sweeper(identity: Arc<IdentityService>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!("Session sweeper running every {:?}", period);
        loop {
            ticker.tick().await;
            let report = identity.sweep().await;
            if !report.is_empty() {
                debug!(
                    "Swept {} expired sessions, {} rate windows",
                    report.sessions, report.rate_windows
                );
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::id_generator::DocumentIdGenerator;
    use crate::infrastructure::identity::IdentityConfig;
    use crate::infrastructure::sqlite_database::SqliteDatabase;

    #[tokio::test]
    async fn test_sweeper_drops_expired_sessions_on_tick() {
        let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        let identity = Arc::new(IdentityService::new(
            db,
            Arc::new(DocumentIdGenerator::new(2)),
            IdentityConfig {
                token_ttl: Duration::ZERO,
                ..IdentityConfig::default()
            },
        ));
        identity.sign_up("park@example.com", "abcd123!").await.unwrap();
        for _ in 0..5 {
            identity.sign_in("park@example.com", "abcd123!").await.unwrap();
        }
        assert_eq!(identity.active_sessions().await, 5);

        let handle = spawn_session_sweeper(identity.clone(), Duration::from_millis(20));
        let mut swept = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if identity.active_sessions().await == 0 {
                swept = true;
                break;
            }
        }
        handle.abort();
        assert!(swept);
    }
}
