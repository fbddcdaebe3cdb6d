// Revocation index over the shared in-memory store
// Two keyspaces: per-token blacklist entries that live exactly as long as
// the token would have, and per-user revocation epochs that reject every
// token issued before a logout-all. Writes fail closed; read behavior is
// policy-driven.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::str::FromStr;
use thiserror::Error;
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::db::RevocationStoreClient;

const BLACKLIST_PREFIX: &str = "jwt:blacklist:";
const EPOCH_PREFIX: &str = "user:revocation-epoch:";

/// Behavior of read paths when the store is unreachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Admit the request and log the divergence
    Open,
    /// Reject with UpstreamUnavailable
    Closed,
}

impl FromStr for FailMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(FailMode::Open),
            "closed" => Ok(FailMode::Closed),
            _ => Err(format!("Invalid revocation fail mode: {}", s)),
        }
    }
}

/// Errors for revocation index operations
#[derive(Error, Debug)]
pub enum RevocationError {
    #[error("Revocation store unavailable: {0}")]
    Unavailable(String),

    #[error("Revocation store timed out")]
    Timeout,
}

/// Revocation index backed by the shared store
pub struct RevocationIndex {
    store: RevocationStoreClient,
    fail_mode: FailMode,
    /// TTL of epoch entries: the refresh-token max lifetime, after which no
    /// token predating the epoch can still be alive
    refresh_ttl: u64,
}

impl RevocationIndex {
    pub fn new(store: RevocationStoreClient, fail_mode: FailMode, refresh_ttl: u64) -> Self {
        Self {
            store,
            fail_mode,
            refresh_ttl,
        }
    }

    /// Pure epoch comparison: a token is epoch-revoked when it was issued
    /// strictly before the user's most recent logout-all.
    pub fn is_epoch_revoked(iat: u64, epoch: Option<u64>) -> bool {
        matches!(epoch, Some(e) if iat < e)
    }

    /// Blacklist one access token for exactly its remaining TTL. Logout is
    /// a write path: the store being down means the logout did not happen,
    /// so errors always propagate.
    pub async fn revoke_token(&self, jti: &str, ttl: u64) -> Result<(), RevocationError> {
        if ttl == 0 {
            // already expired; nothing to index
            return Ok(());
        }

        let key = format!("{}{}", BLACKLIST_PREFIX, jti);
        self.run(move |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, "revoked", ttl).await
        })
        .await
    }

    /// O(1) blacklist lookup. Honors the configured fail mode when the
    /// store is unreachable.
    pub async fn is_revoked(&self, jti: &str) -> Result<bool, RevocationError> {
        let key = format!("{}{}", BLACKLIST_PREFIX, jti);
        let result = self
            .run(move |mut conn| async move { conn.exists::<_, bool>(&key).await })
            .await;

        self.read_result(result, false, "blacklist lookup")
    }

    /// Set the per-user revocation epoch to `epoch` (unix seconds). Write
    /// path: always fails closed.
    pub async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        epoch: u64,
    ) -> Result<(), RevocationError> {
        let key = format!("{}{}", EPOCH_PREFIX, user_id);
        let ttl = self.refresh_ttl;
        self.run(move |mut conn| async move {
            conn.set_ex::<_, _, ()>(key, epoch, ttl).await
        })
        .await
    }

    /// The user's revocation epoch, if one is set
    pub async fn epoch_for(&self, user_id: Uuid) -> Result<Option<u64>, RevocationError> {
        let key = format!("{}{}", EPOCH_PREFIX, user_id);
        let result = self
            .run(move |mut conn| async move { conn.get::<_, Option<u64>>(&key).await })
            .await;

        self.read_result(result, None, "epoch lookup")
    }

    /// Combined kernel check: blacklisted jti or issued before the user's
    /// revocation epoch.
    pub async fn is_token_revoked(
        &self,
        jti: &str,
        user_id: Uuid,
        iat: u64,
    ) -> Result<bool, RevocationError> {
        if self.is_revoked(jti).await? {
            return Ok(true);
        }
        let epoch = self.epoch_for(user_id).await?;
        Ok(Self::is_epoch_revoked(iat, epoch))
    }

    /// Run one command against the store under the configured per-command
    /// budget. A dropped future (request cancellation, timeout) leaves no
    /// state behind beyond the single idempotent key write it may have
    /// completed.
    async fn run<T, F, Fut>(&self, f: F) -> Result<T, RevocationError>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T, redis::RedisError>>,
    {
        match timeout(self.store.command_timeout(), f(self.store.connection())).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RevocationError::Unavailable(e.to_string())),
            Err(_) => Err(RevocationError::Timeout),
        }
    }

    fn read_result<T>(
        &self,
        result: Result<T, RevocationError>,
        fallback: T,
        operation: &str,
    ) -> Result<T, RevocationError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => match self.fail_mode {
                FailMode::Open => {
                    warn!(
                        "Revocation store {} failed, admitting per fail-open policy: {}",
                        operation, e
                    );
                    Ok(fallback)
                },
                FailMode::Closed => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_mode_parsing() {
        assert_eq!(FailMode::from_str("open"), Ok(FailMode::Open));
        assert_eq!(FailMode::from_str("closed"), Ok(FailMode::Closed));
        assert_eq!(FailMode::from_str("CLOSED"), Ok(FailMode::Closed));
        assert!(FailMode::from_str("maybe").is_err());
    }

    #[test]
    fn test_epoch_comparison() {
        // no epoch set: nothing is epoch-revoked
        assert!(!RevocationIndex::is_epoch_revoked(1_000, None));

        // issued before the epoch: revoked
        assert!(RevocationIndex::is_epoch_revoked(999, Some(1_000)));

        // issued at or after the epoch: still valid
        assert!(!RevocationIndex::is_epoch_revoked(1_000, Some(1_000)));
        assert!(!RevocationIndex::is_epoch_revoked(1_001, Some(1_000)));
    }
}
