use std::sync::Arc;

use crate::{
    config::Config,
    infrastructure::{
        blob_storage::LocalBlobStorage,
        cache::ProfileCache,
        database::DatabaseInterface,
        id_generator::DocumentIdGenerator,
        identity::IdentityService,
        middleware::HasIdentity,
        sqlite_database::SqliteDatabase,
    },
    services::{AuthService, MediaService, PostService},
};

/// Node id baked into every generated document id
const NODE_ID: u16 = 1;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub database: Arc<dyn DatabaseInterface>,
    pub identity: Arc<IdentityService>,
    pub auth: Arc<AuthService>,
    pub media: Arc<MediaService>,
    pub posts: Arc<PostService>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let database =
            SqliteDatabase::connect(&config.database.url, config.database.max_connections).await?;
        Ok(Self::with_database(config, Arc::new(database)))
    }

    /// Wires every service over one store; the store doubles as the credential store.
    pub fn with_database(config: Config, database: Arc<SqliteDatabase>) -> Self {
        let ids = Arc::new(DocumentIdGenerator::new(NODE_ID));
        let identity = Arc::new(IdentityService::new(
            database.clone(),
            ids.clone(),
            config.identity_config(),
        ));
        let profiles = Arc::new(ProfileCache::new(config.cache.capacity));
        let auth = Arc::new(AuthService::new(identity.clone(), database.clone(), profiles));

        let storage = Arc::new(LocalBlobStorage::new(
            &config.storage.root,
            &config.storage.public_base_url,
        ));
        let media = Arc::new(MediaService::new(storage));
        let posts = Arc::new(PostService::new(
            database.clone(),
            ids,
            media.clone(),
            config.page_settings(),
        ));

        Self {
            config,
            database,
            identity,
            auth,
            media,
            posts,
        }
    }
}

impl HasIdentity for AppState {
    fn identity(&self) -> &Arc<IdentityService> {
        &self.identity
    }
}
