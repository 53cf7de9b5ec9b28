// Session/User access - registration, login, logout and current-user lookup
// The identity record and the profile document share one uid

use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::core::strong_types::{current_time_millis, millis_to_datetime, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::cache::ProfileCache;
use crate::infrastructure::database::DatabaseInterface;
use crate::infrastructure::identity::{normalize_email, IdentityService, SessionContext};
use crate::models::User;
use crate::validation::{LoginForm, RegisterForm};

/// Profile plus the session opened for it
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
    pub session: SessionContext,
}

pub struct AuthService {
    identity: Arc<IdentityService>,
    db: Arc<dyn DatabaseInterface>,
    profiles: Arc<ProfileCache>,
}

impl AuthService {
    pub fn new(
        identity: Arc<IdentityService>,
        db: Arc<dyn DatabaseInterface>,
        profiles: Arc<ProfileCache>,
    ) -> Self {
        Self {
            identity,
            db,
            profiles,
        }
    }

    /// Creates the identity, then the profile document under the same uid.
    /// A failed profile write removes the identity again.
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn register(&self, form: &RegisterForm) -> AppResult<AuthSession> {
        form.validate()?;
        let display_name = form.resolved_display_name();

        let uid = self.identity.sign_up(&form.email, &form.password).await?;

        let now = millis_to_datetime(current_time_millis());
        let user = User {
            id: uid,
            email: normalize_email(&form.email),
            display_name,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.db.create_user(&user).await {
            warn!("Profile write failed for {}, removing identity: {}", uid, err);
            if let Err(cleanup) = self.identity.delete_identity(uid).await {
                error!("Identity {} left without a profile: {}", uid, cleanup);
            }
            return Err(err);
        }
        self.profiles.put(user.clone()).await;

        let issued = self.identity.open_session(uid, &user.email).await?;
        info!("Registered user {} ({})", uid, user.display_name);
        Ok(AuthSession {
            user,
            token: issued.token,
            session: issued.session,
        })
    }

    /// Fails when the identity has no profile document; that session is revoked again.
    #[instrument(skip(self, form), fields(email = %form.email))]
    pub async fn login(&self, form: &LoginForm) -> AppResult<AuthSession> {
        form.validate()?;
        let issued = self.identity.sign_in(&form.email, &form.password).await?;

        match self.profile(issued.session.user_id).await? {
            Some(user) => Ok(AuthSession {
                user,
                token: issued.token,
                session: issued.session,
            }),
            None => {
                warn!("Identity {} has no profile document", issued.session.user_id);
                self.identity.sign_out(&issued.session.session_id).await?;
                Err(AppError::NotFound("사용자 정보를 찾을 수 없습니다.".to_string()))
            }
        }
    }

    pub async fn logout(&self, session: &SessionContext) -> AppResult<()> {
        self.identity.sign_out(&session.session_id).await
    }

    /// Profile of the session's user, or `None` without a session or profile.
    pub async fn get_current_user(
        &self,
        session: Option<&SessionContext>,
    ) -> AppResult<Option<User>> {
        match session {
            Some(session) => self.profile(session.user_id).await,
            None => Ok(None),
        }
    }

    /// Profile for an authenticated action; a session without a profile is rejected.
    pub async fn require_profile(&self, session: &SessionContext) -> AppResult<User> {
        self.profile(session.user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("사용자 정보를 찾을 수 없습니다.".to_string()))
    }

    pub async fn profile(&self, uid: UserId) -> AppResult<Option<User>> {
        if let Some(user) = self.profiles.get(uid).await {
            return Ok(Some(user));
        }
        let user = self.db.get_user(uid).await?;
        if let Some(user) = &user {
            self.profiles.put(user.clone()).await;
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::id_generator::DocumentIdGenerator;
    use crate::infrastructure::identity::{IdentityConfig, IdentityErrorCode};
    use crate::infrastructure::sqlite_database::SqliteDatabase;
    use crate::core::strong_types::PostId;
    use crate::models::{Comment, FeedCursor, Post, PostChanges};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    struct Fixture {
        auth: AuthService,
        identity: Arc<IdentityService>,
        db: Arc<SqliteDatabase>,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        let identity = Arc::new(IdentityService::new(
            db.clone(),
            Arc::new(DocumentIdGenerator::new(1)),
            IdentityConfig::default(),
        ));
        let auth = AuthService::new(identity.clone(), db.clone(), Arc::new(ProfileCache::new(16)));
        Fixture { auth, identity, db }
    }

    fn register_form(email: &str) -> RegisterForm {
        RegisterForm {
            email: email.to_string(),
            password: "abcd123!".to_string(),
            confirm_password: "abcd123!".to_string(),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_register_links_identity_and_profile() {
        let fx = fixture().await;
        let registered = fx.auth.register(&register_form("park@example.com")).await.unwrap();

        assert_eq!(registered.user.id, registered.session.user_id);
        assert_eq!(registered.user.display_name, "park");
        assert!(fx.identity.identity_exists(registered.user.id).await.unwrap());

        let stored = fx.db.get_user(registered.user.id).await.unwrap().unwrap();
        assert_eq!(stored, registered.user);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_form_before_identity() {
        let fx = fixture().await;
        let mut form = register_form("park@example.com");
        form.confirm_password = "different1!".to_string();

        assert!(matches!(
            fx.auth.register(&form).await,
            Err(AppError::InvalidForm(_))
        ));
        // Nothing was created, so the same email registers fine afterwards
        assert!(fx.auth.register(&register_form("park@example.com")).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_and_current_user() {
        let fx = fixture().await;
        fx.auth.register(&register_form("choi@example.com")).await.unwrap();

        let login = fx
            .auth
            .login(&LoginForm {
                email: "choi@example.com".to_string(),
                password: "abcd123!".to_string(),
            })
            .await
            .unwrap();
        let current = fx.auth.get_current_user(Some(&login.session)).await.unwrap();
        assert_eq!(current, Some(login.user.clone()));
        assert_eq!(fx.auth.get_current_user(None).await.unwrap(), None);

        fx.auth.logout(&login.session).await.unwrap();
        assert!(fx.identity.validate_token(&login.token).await.is_err());
    }

    #[tokio::test]
    async fn test_login_fails_without_profile_document() {
        let fx = fixture().await;
        fx.identity.sign_up("ghost@example.com", "abcd123!").await.unwrap();

        let result = fx
            .auth
            .login(&LoginForm {
                email: "ghost@example.com".to_string(),
                password: "abcd123!".to_string(),
            })
            .await;
        match result {
            Err(AppError::NotFound(msg)) => assert_eq!(msg, "사용자 정보를 찾을 수 없습니다."),
            other => panic!("unexpected result: {:?}", other.map(|s| s.user)),
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_surfaces_identity_code() {
        let fx = fixture().await;
        fx.auth.register(&register_form("dup@example.com")).await.unwrap();
        match fx.auth.register(&register_form("dup@example.com")).await {
            Err(AppError::Identity(code)) => assert_eq!(code, IdentityErrorCode::EmailAlreadyInUse),
            other => panic!("unexpected result: {:?}", other.map(|s| s.user)),
        }
    }

    #[tokio::test]
    async fn test_cached_and_stored_profiles_match() {
        let fx = fixture().await;
        let registered = fx.auth.register(&register_form("han@example.com")).await.unwrap();

        let cold = AuthService::new(
            fx.identity.clone(),
            fx.db.clone(),
            Arc::new(ProfileCache::new(16)),
        );
        let warm = fx.auth.get_current_user(Some(&registered.session)).await.unwrap();
        let fetched = cold.get_current_user(Some(&registered.session)).await.unwrap();
        assert_eq!(warm, Some(registered.user.clone()));
        assert_eq!(fetched, warm);
        assert_eq!(
            registered.user.created_at.timestamp_subsec_nanos() % 1_000_000,
            0
        );
    }

    /// Store whose profile writes fail while `fail_profiles` is set
    struct FlakyProfileStore {
        inner: Arc<SqliteDatabase>,
        fail_profiles: AtomicBool,
        attempted: StdMutex<Option<UserId>>,
    }

    #[async_trait]
    impl DatabaseInterface for FlakyProfileStore {
        async fn health_check(&self) -> AppResult<()> {
            self.inner.health_check().await
        }
        async fn create_user(&self, user: &User) -> AppResult<()> {
            *self.attempted.lock().unwrap() = Some(user.id);
            if self.fail_profiles.load(Ordering::SeqCst) {
                return Err(AppError::DatabaseError("disk full".to_string()));
            }
            self.inner.create_user(user).await
        }
        async fn get_user(&self, id: UserId) -> AppResult<Option<User>> {
            self.inner.get_user(id).await
        }
        async fn create_post(&self, post: &Post) -> AppResult<()> {
            self.inner.create_post(post).await
        }
        async fn get_post(&self, id: PostId) -> AppResult<Option<Post>> {
            self.inner.get_post(id).await
        }
        async fn update_post(
            &self,
            id: PostId,
            changes: &PostChanges,
            updated_at_millis: i64,
        ) -> AppResult<bool> {
            self.inner.update_post(id, changes, updated_at_millis).await
        }
        async fn delete_post(&self, id: PostId) -> AppResult<bool> {
            self.inner.delete_post(id).await
        }
        async fn list_posts(&self, limit: u64, offset: u64) -> AppResult<Vec<Post>> {
            self.inner.list_posts(limit, offset).await
        }
        async fn list_posts_after(
            &self,
            cursor: Option<FeedCursor>,
            limit: u64,
        ) -> AppResult<Vec<Post>> {
            self.inner.list_posts_after(cursor, limit).await
        }
        async fn count_posts(&self) -> AppResult<u64> {
            self.inner.count_posts().await
        }
        async fn list_comment_counters(&self) -> AppResult<Vec<(PostId, i64)>> {
            self.inner.list_comment_counters().await
        }
        async fn set_comment_count_if(
            &self,
            id: PostId,
            expected: i64,
            value: i64,
        ) -> AppResult<bool> {
            self.inner.set_comment_count_if(id, expected, value).await
        }
        async fn add_comment(&self, comment: &Comment) -> AppResult<bool> {
            self.inner.add_comment(comment).await
        }
        async fn list_comments(&self, post_id: PostId) -> AppResult<Vec<Comment>> {
            self.inner.list_comments(post_id).await
        }
        async fn count_comments(&self, post_id: PostId) -> AppResult<i64> {
            self.inner.count_comments(post_id).await
        }
    }

    #[tokio::test]
    async fn test_failed_profile_write_removes_identity() {
        let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        let identity = Arc::new(IdentityService::new(
            db.clone(),
            Arc::new(DocumentIdGenerator::new(1)),
            IdentityConfig::default(),
        ));
        let store = Arc::new(FlakyProfileStore {
            inner: db.clone(),
            fail_profiles: AtomicBool::new(true),
            attempted: StdMutex::new(None),
        });
        let profiles = Arc::new(ProfileCache::new(16));
        let auth = AuthService::new(identity.clone(), store.clone(), profiles);

        let result = auth.register(&register_form("flaky@example.com")).await;
        assert!(matches!(result, Err(AppError::DatabaseError(_))));

        let uid = store.attempted.lock().unwrap().take().unwrap();
        assert!(!identity.identity_exists(uid).await.unwrap());
        assert_eq!(db.get_user(uid).await.unwrap(), None);

        store.fail_profiles.store(false, Ordering::SeqCst);
        let registered = auth.register(&register_form("flaky@example.com")).await.unwrap();
        assert_ne!(registered.user.id, uid);
        assert!(identity.identity_exists(registered.user.id).await.unwrap());
    }
}
