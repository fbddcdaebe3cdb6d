// Signing key lifecycle
// The Authority owns a pool of RSA key pairs; rotation is overlap-based so
// tokens issued under an outgoing key keep verifying until it expires.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::info;

use crate::db::DieselPool;
use crate::models::{JwksDocument, NewSigningKey, SigningKey, SigningKeyError};

/// A replacement key is published this many days before the primary
/// expires, so validators see the overlap window well ahead of cutover.
const ROTATION_LEAD_DAYS: i64 = 7;

/// Errors for key store operations
#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error(transparent)]
    Key(#[from] SigningKeyError),

    #[error("No active signing key")]
    NoActiveKey,
}

/// Persistent pool of asymmetric signing keys
pub struct KeyStore {
    pool: DieselPool,
    key_expiry_days: i64,
}

impl KeyStore {
    pub fn new(pool: DieselPool, key_expiry_days: i64) -> Self {
        Self {
            pool,
            key_expiry_days,
        }
    }

    async fn conn(
        &self,
    ) -> Result<
        bb8::PooledConnection<
            '_,
            diesel_async::pooled_connection::AsyncDieselConnectionManager<
                diesel_async::AsyncPgConnection,
            >,
        >,
        KeyStoreError,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| KeyStoreError::Pool(e.to_string()))
    }

    /// All keys with expiry null or strictly after `t`
    pub async fn active_keys_at(
        &self,
        t: DateTime<Utc>,
    ) -> Result<Vec<SigningKey>, KeyStoreError> {
        let mut conn = self.conn().await?;
        Ok(SigningKey::active_at(&mut conn, t).await?)
    }

    /// Selection policy: the most recently created active key
    pub async fn primary_signing_key_at(
        &self,
        t: DateTime<Utc>,
    ) -> Result<SigningKey, KeyStoreError> {
        let keys = self.active_keys_at(t).await?;
        SigningKey::select_primary(&keys, t)
            .cloned()
            .ok_or(KeyStoreError::NoActiveKey)
    }

    /// Create a signing key if none is active at `t`. Invoked on startup;
    /// after bootstrap there is always at least one live key.
    pub async fn ensure_bootstrap(&self, t: DateTime<Utc>) -> Result<SigningKey, KeyStoreError> {
        if let Ok(existing) = self.primary_signing_key_at(t).await {
            return Ok(existing);
        }

        let key = self.generate_key().await?;
        info!(kid = %key.kid, "Bootstrapped signing key");
        Ok(key)
    }

    /// Publish a fresh key as the new primary. The outgoing key stays in
    /// the active set until its own expiry passes.
    pub async fn rotate(&self) -> Result<SigningKey, KeyStoreError> {
        let key = self.generate_key().await?;
        info!(kid = %key.kid, "Rotated to new signing key");
        Ok(key)
    }

    /// True when the primary is missing or expires within the lead window
    pub fn needs_rotation(primary_expires_at: Option<DateTime<Utc>>, t: DateTime<Utc>) -> bool {
        match primary_expires_at {
            None => false,
            Some(expiry) => expiry <= t + Duration::days(ROTATION_LEAD_DAYS),
        }
    }

    /// Periodic rotation check: publish a successor while the outgoing
    /// primary still has its overlap window left. Invoked from a
    /// background task.
    pub async fn rotate_if_due(&self, t: DateTime<Utc>) -> Result<Option<SigningKey>, KeyStoreError> {
        let primary = match self.primary_signing_key_at(t).await {
            Ok(key) => key,
            Err(KeyStoreError::NoActiveKey) => return self.ensure_bootstrap(t).await.map(Some),
            Err(e) => return Err(e),
        };

        if Self::needs_rotation(primary.expires_at, t) {
            return self.rotate().await.map(Some);
        }
        Ok(None)
    }

    async fn generate_key(&self) -> Result<SigningKey, KeyStoreError> {
        let expires_at = Utc::now() + Duration::days(self.key_expiry_days);
        let new_key = NewSigningKey::generate(Some(expires_at))?;

        let mut conn = self.conn().await?;
        Ok(SigningKey::create(&mut conn, new_key).await?)
    }

    /// The current public key set in JWKS form. Keys whose public material
    /// fails to parse are logged and skipped rather than poisoning the
    /// whole document.
    pub async fn jwks_document(&self, t: DateTime<Utc>) -> Result<JwksDocument, KeyStoreError> {
        let keys = self.active_keys_at(t).await?;

        let mut jwks = Vec::with_capacity(keys.len());
        for key in &keys {
            match key.to_jwk() {
                Ok(jwk) => jwks.push(jwk),
                Err(e) => {
                    tracing::error!(kid = %key.kid, "Skipping unparseable signing key: {}", e);
                },
            }
        }

        Ok(JwksDocument { keys: jwks })
    }
}
