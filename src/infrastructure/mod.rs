// Core infrastructure modules
pub mod blob_storage;          // Blob storage trait and filesystem implementation
pub mod cache;                 // LRU cache and profile cache
pub mod database;              // Document store interface
pub mod id_generator;          // Snowflake document ids
pub mod identity;              // Accounts, sessions and tokens
pub mod middleware;            // Request extractors
pub mod sqlite_database;       // SQLite document store

// Re-export core infrastructure components
pub use blob_storage::{BlobStorage, LocalBlobStorage};
pub use cache::{Cache, ProfileCache};
pub use database::{CredentialRecord, CredentialStore, DatabaseInterface};
pub use id_generator::DocumentIdGenerator;
pub use identity::{IdentityConfig, IdentityErrorCode, IdentityService, SessionContext};
pub use sqlite_database::SqliteDatabase;
