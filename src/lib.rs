// Library exports for the identity core
// Backend services embed the trust kernel and key-set cache from here;
// the Authority binary lives in main.rs.

pub mod app;
pub mod app_config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod migrations;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app::AppState;
pub use app_config::{AppConfig, ConfigError, Environment};
pub use db::{DieselPool, RedisConfig, RevocationStoreClient};
pub use middleware::{
    authorize, dynamic_cors, edge_validator, trust_kernel, Access, Principal, RequestContext,
    ResourceRef,
};
pub use models::{AccessTokenClaims, JwkKey, JwksDocument, Role};
pub use services::{
    AuthService, FailMode, IssuedTokens, JwksCache, KeyStore, PasswordConfig, PasswordService,
    RevocationIndex, TokenError, TokenService, VerificationKeySet,
};
pub use utils::{AuthError, PathMatcher};

// Re-export handler route builders
pub use handlers::{api_routes, auth_routes, well_known_routes};
