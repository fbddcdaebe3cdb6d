// Application state and configuration
// Everything the planes share is constructed once at process start and
// injected; nothing trust-critical lives in a global.
use std::sync::Arc;

use crate::{
    app_config::AppConfig,
    db::{DieselPool, RevocationStoreClient},
    services::{AuthService, JwksCache, KeyStore, RevocationIndex},
    utils::PathMatcher,
};

// Application state shared across handlers and the trust middleware
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub diesel_pool: DieselPool,
    pub revocation_store: RevocationStoreClient,
    pub auth: Arc<AuthService>,
    pub keystore: Arc<KeyStore>,
    pub revocation: Arc<RevocationIndex>,
    pub jwks_cache: Arc<JwksCache>,
    pub public_paths: Arc<PathMatcher>,
}
