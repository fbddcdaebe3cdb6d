// Database models for the identity authority

pub mod claims;
pub mod refresh_token;
pub mod role_grant;
pub mod signing_key;
pub mod tenant;
pub mod user;

pub use claims::AccessTokenClaims;
pub use refresh_token::{NewRefreshToken, RefreshToken, RefreshTokenError};
pub use role_grant::{NewRoleGrant, Role, RoleGrant, RoleGrantError};
pub use signing_key::{JwkKey, JwksDocument, NewSigningKey, SigningKey, SigningKeyError};
pub use tenant::{NewTenant, Tenant, TenantError, TenantStatus, DEFAULT_TENANT_ID};
pub use user::{NewUser, User, UserError};
