// Services module for the identity core
// Business logic layer composing the trust planes

pub mod auth;
pub mod jwks_cache;
pub mod keystore;
pub mod password;
pub mod revocation;
pub mod token;

pub use auth::{AuthService, IssuedTokens, LoginInput, RegisterInput};
pub use jwks_cache::{JwksCache, JwksError, VerifyError};
pub use keystore::{KeyStore, KeyStoreError};
pub use password::{PasswordConfig, PasswordError, PasswordService};
pub use revocation::{FailMode, RevocationError, RevocationIndex};
pub use token::{TokenError, TokenService, VerificationKeySet};
