// Identity backend - email/password accounts, sessions and signed session tokens
// Credentials live in the credential store; sessions are held in memory per process

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::http::StatusCode;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::core::strong_types::{current_time_millis, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{CredentialRecord, CredentialStore};
use crate::infrastructure::id_generator::DocumentIdGenerator;

const TOKEN_AUDIENCE: &str = "community-board";
const TOKEN_ISSUER: &str = "community-board-identity";
/// The identity backend's own floor, independent of the stricter form rules
const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

/// Failure codes surfaced by the identity backend, wire form `auth/<code>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityErrorCode {
    InvalidCredential,
    UserNotFound,
    WrongPassword,
    InvalidEmail,
    UserDisabled,
    TooManyRequests,
    NetworkRequestFailed,
    EmailAlreadyInUse,
    WeakPassword,
}

impl IdentityErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityErrorCode::InvalidCredential => "auth/invalid-credential",
            IdentityErrorCode::UserNotFound => "auth/user-not-found",
            IdentityErrorCode::WrongPassword => "auth/wrong-password",
            IdentityErrorCode::InvalidEmail => "auth/invalid-email",
            IdentityErrorCode::UserDisabled => "auth/user-disabled",
            IdentityErrorCode::TooManyRequests => "auth/too-many-requests",
            IdentityErrorCode::NetworkRequestFailed => "auth/network-request-failed",
            IdentityErrorCode::EmailAlreadyInUse => "auth/email-already-in-use",
            IdentityErrorCode::WeakPassword => "auth/weak-password",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        let all = [
            IdentityErrorCode::InvalidCredential,
            IdentityErrorCode::UserNotFound,
            IdentityErrorCode::WrongPassword,
            IdentityErrorCode::InvalidEmail,
            IdentityErrorCode::UserDisabled,
            IdentityErrorCode::TooManyRequests,
            IdentityErrorCode::NetworkRequestFailed,
            IdentityErrorCode::EmailAlreadyInUse,
            IdentityErrorCode::WeakPassword,
        ];
        all.into_iter().find(|c| c.as_str() == code)
    }

    /// User-facing message shown for this failure.
    pub fn localized_message(&self) -> &'static str {
        match self {
            IdentityErrorCode::InvalidCredential => "올바른 이메일과 비밀번호를 입력해주세요.",
            IdentityErrorCode::UserNotFound => "존재하지 않는 이메일입니다.",
            IdentityErrorCode::WrongPassword => "비밀번호가 올바르지 않습니다.",
            IdentityErrorCode::InvalidEmail => "올바른 이메일 형식이 아닙니다.",
            IdentityErrorCode::UserDisabled => "비활성화된 계정입니다.",
            IdentityErrorCode::TooManyRequests => "너무 많은 시도로 인해 일시적으로 차단되었습니다.",
            IdentityErrorCode::NetworkRequestFailed => "네트워크 연결을 확인해주세요.",
            IdentityErrorCode::EmailAlreadyInUse => "이미 존재하는 이메일입니다.",
            IdentityErrorCode::WeakPassword => "비밀번호가 너무 약합니다.",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            IdentityErrorCode::InvalidCredential
            | IdentityErrorCode::UserNotFound
            | IdentityErrorCode::WrongPassword => StatusCode::UNAUTHORIZED,
            IdentityErrorCode::InvalidEmail | IdentityErrorCode::WeakPassword => {
                StatusCode::BAD_REQUEST
            }
            IdentityErrorCode::UserDisabled => StatusCode::FORBIDDEN,
            IdentityErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            IdentityErrorCode::NetworkRequestFailed => StatusCode::SERVICE_UNAVAILABLE,
            IdentityErrorCode::EmailAlreadyInUse => StatusCode::CONFLICT,
        }
    }
}

/// Message for codes that arrive as raw strings; unknown codes get the generic retry text.
pub fn localized_message_for(code: &str) -> &'static str {
    IdentityErrorCode::parse(code)
        .map(|c| c.localized_message())
        .unwrap_or("다시 시도하세요.")
}

/// Authenticated session, resolved once per request and passed explicitly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: UserId,
    pub session_id: String,
    pub email: String,
    pub issued_at_millis: i64,
    pub expires_at_millis: i64,
}

impl SessionContext {
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at_millis
    }
}

/// Token and session handed out by sign-in
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session: SessionContext,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: u64,
    exp: u64,
    aud: String,
    iss: String,
    sid: String,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub max_failed_attempts: u32,
    pub lockout_duration: Duration,
    pub sign_in_rate_per_minute: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            token_ttl: Duration::from_secs(24 * 3600),
            max_failed_attempts: 5,
            lockout_duration: Duration::from_secs(900),
            sign_in_rate_per_minute: 20,
        }
    }
}

pub struct IdentityService {
    store: Arc<dyn CredentialStore>,
    id_generator: Arc<DocumentIdGenerator>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    sessions: RwLock<HashMap<String, SessionContext>>,
    rate_limiter: RateLimiter,
    config: IdentityConfig,
}

/// Emails are matched case-insensitively and stored lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl IdentityService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        id_generator: Arc<DocumentIdGenerator>,
        config: IdentityConfig,
    ) -> Self {
        Self {
            store,
            id_generator,
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            sessions: RwLock::new(HashMap::new()),
            rate_limiter: RateLimiter::new(config.sign_in_rate_per_minute),
            config,
        }
    }

    /// Creates the identity record and returns its uid.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> AppResult<UserId> {
        let email = normalize_email(email);
        if !EMAIL_RE.is_match(&email) {
            return Err(IdentityErrorCode::InvalidEmail.into());
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityErrorCode::WeakPassword.into());
        }

        // The unique email index still rejects a concurrent duplicate below
        if self.store.find_credentials_by_email(&email).await?.is_some() {
            return Err(IdentityErrorCode::EmailAlreadyInUse.into());
        }

        let password_hash = hash_password(password.to_string()).await?;
        let uid = UserId(self.id_generator.next_id());
        let record = CredentialRecord {
            uid,
            email: email.clone(),
            password_hash,
            disabled: false,
            failed_attempts: 0,
            locked_until_millis: None,
            created_at_millis: current_time_millis(),
        };

        if !self.store.insert_credentials(&record).await? {
            return Err(IdentityErrorCode::EmailAlreadyInUse.into());
        }

        info!("AUDIT: identity {} created for {}", uid, email);
        Ok(uid)
    }

    /// Verifies the password and opens a session.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<IssuedSession> {
        let email = normalize_email(email);
        if !EMAIL_RE.is_match(&email) {
            return Err(IdentityErrorCode::InvalidEmail.into());
        }

        if !self.rate_limiter.check_rate_limit(&email).await {
            warn!("AUDIT: sign-in rate limit exceeded for {}", email);
            return Err(IdentityErrorCode::TooManyRequests.into());
        }

        let record = self
            .store
            .find_credentials_by_email(&email)
            .await?
            .ok_or(IdentityErrorCode::UserNotFound)?;

        if record.disabled {
            return Err(IdentityErrorCode::UserDisabled.into());
        }

        let now = current_time_millis();
        let mut failed_attempts = record.failed_attempts;
        if let Some(locked_until) = record.locked_until_millis {
            if now < locked_until {
                return Err(IdentityErrorCode::TooManyRequests.into());
            }
            // Lock expired
            failed_attempts = 0;
        }

        if !verify_password(password.to_string(), record.password_hash.clone()).await? {
            failed_attempts += 1;
            if failed_attempts >= self.config.max_failed_attempts {
                let locked_until = now + duration_millis(self.config.lockout_duration);
                self.store
                    .update_sign_in_state(record.uid, failed_attempts, Some(locked_until))
                    .await?;
                warn!(
                    "AUDIT: account {} locked after {} failed attempts",
                    record.uid, failed_attempts
                );
                return Err(IdentityErrorCode::TooManyRequests.into());
            }
            self.store
                .update_sign_in_state(record.uid, failed_attempts, None)
                .await?;
            warn!("AUDIT: failed sign-in for {}", record.uid);
            return Err(IdentityErrorCode::WrongPassword.into());
        }

        if record.failed_attempts != 0 || record.locked_until_millis.is_some() {
            self.store.update_sign_in_state(record.uid, 0, None).await?;
        }

        let issued = self.open_session(record.uid, &record.email).await?;
        info!("AUDIT: identity {} signed in", record.uid);
        Ok(issued)
    }

    /// Starts a session for an identity that was just verified or created.
    pub async fn open_session(&self, uid: UserId, email: &str) -> AppResult<IssuedSession> {
        let now = current_time_millis();
        let session = SessionContext {
            user_id: uid,
            session_id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            issued_at_millis: now,
            expires_at_millis: now + duration_millis(self.config.token_ttl),
        };

        let claims = Claims {
            sub: uid.to_string(),
            iat: (session.issued_at_millis / 1000).max(0) as u64,
            exp: (session.expires_at_millis / 1000).max(0) as u64,
            aud: TOKEN_AUDIENCE.to_string(),
            iss: TOKEN_ISSUER.to_string(),
            sid: session.session_id.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());

        Ok(IssuedSession { token, session })
    }

    /// Resolves a bearer token to its live session.
    pub async fn validate_token(&self, token: &str) -> AppResult<SessionContext> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.set_issuer(&[TOKEN_ISSUER]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?
            .claims;

        let sessions = self.sessions.read().await;
        let session = sessions
            .get(&claims.sid)
            .ok_or_else(|| AppError::Unauthorized("Session not found".to_string()))?;

        if session.is_expired_at(current_time_millis()) {
            return Err(AppError::Unauthorized("Session expired".to_string()));
        }
        if session.user_id.to_string() != claims.sub {
            return Err(AppError::Unauthorized("Token subject mismatch".to_string()));
        }

        Ok(session.clone())
    }

    #[instrument(skip(self))]
    pub async fn sign_out(&self, session_id: &str) -> AppResult<()> {
        if let Some(session) = self.sessions.write().await.remove(session_id) {
            info!("AUDIT: identity {} signed out", session.user_id);
        }
        Ok(())
    }

    /// Removes the identity record and any of its live sessions.
    #[instrument(skip(self))]
    pub async fn delete_identity(&self, uid: UserId) -> AppResult<bool> {
        self.sessions
            .write()
            .await
            .retain(|_, session| session.user_id != uid);
        let removed = self.store.delete_credentials(uid).await?;
        if removed {
            info!("AUDIT: identity {} deleted", uid);
        }
        Ok(removed)
    }

    pub async fn set_disabled(&self, uid: UserId, disabled: bool) -> AppResult<bool> {
        if disabled {
            self.sessions
                .write()
                .await
                .retain(|_, session| session.user_id != uid);
        }
        self.store.set_disabled(uid, disabled).await
    }

    pub async fn identity_exists(&self, uid: UserId) -> AppResult<bool> {
        Ok(self.store.find_credentials(uid).await?.is_some())
    }

    pub async fn cleanup_expired_sessions(&self) -> usize {
        self.cleanup_sessions_at(current_time_millis()).await
    }

    async fn cleanup_sessions_at(&self, now_millis: i64) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now_millis));
        before - sessions.len()
    }

    /// Drops expired sessions and closed rate-limit windows.
    pub async fn sweep(&self) -> SweepReport {
        let now = current_time_millis();
        SweepReport {
            sessions: self.cleanup_sessions_at(now).await,
            rate_windows: self.rate_limiter.prune_expired_at(now).await,
        }
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: usize,
    pub rate_windows: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.sessions == 0 && self.rate_windows == 0
    }
}

/// Hashing and verification run on the blocking pool.
async fn hash_password(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    })
    .await
    .map_err(|e| AppError::Internal(format!("Password verification task failed: {}", e)))?
}

const RATE_WINDOW_MILLIS: i64 = 60_000;

/// Fixed one-minute window per identifier
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: u32,
    windows: RwLock<HashMap<String, RateLimitWindow>>,
}

#[derive(Debug)]
struct RateLimitWindow {
    requests: u32,
    window_start_millis: i64,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub async fn check_rate_limit(&self, identifier: &str) -> bool {
        let mut windows = self.windows.write().await;
        let now = current_time_millis();

        let window = windows
            .entry(identifier.to_string())
            .or_insert(RateLimitWindow {
                requests: 0,
                window_start_millis: now,
            });

        if now - window.window_start_millis >= RATE_WINDOW_MILLIS {
            window.requests = 0;
            window.window_start_millis = now;
        }

        if window.requests >= self.requests_per_minute {
            false
        } else {
            window.requests += 1;
            true
        }
    }

    /// Removes windows that closed before `now_millis`; returns how many were dropped.
    pub async fn prune_expired_at(&self, now_millis: i64) -> usize {
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, window| now_millis - window.window_start_millis < RATE_WINDOW_MILLIS);
        before - windows.len()
    }

    pub async fn tracked(&self) -> usize {
        self.windows.read().await.len()
    }
}
