// Access token claims
// The signed payload every plane agrees on: subject, tenant, roles and the
// jti revocation handle. Access tokens are never persisted.

use serde::{Deserialize, Serialize};

/// Access token claims structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// User ID (subject)
    pub sub: String,

    /// Tenant the subject belongs to
    pub tenant_id: String,

    /// Roles granted to the subject
    pub roles: Vec<String>,

    /// JWT ID, unique per issuance - the revocation handle
    pub jti: String,

    /// Issued at timestamp (Unix epoch seconds)
    pub iat: u64,

    /// Expires at timestamp (Unix epoch seconds)
    pub exp: u64,

    /// Issuer
    pub iss: String,
}

impl AccessTokenClaims {
    /// Check expiry against a caller-supplied clock
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exp <= now
    }

    /// Seconds of validity left at `now`; zero once expired
    pub fn remaining_ttl_at(&self, now: u64) -> u64 {
        self.exp.saturating_sub(now)
    }
}
