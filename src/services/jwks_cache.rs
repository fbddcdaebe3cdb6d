// Cached public key set for validators
// The gateway and every backend kernel verify against a snapshot of the
// Authority's published keys, refreshed in the background. An UnknownKid
// failure triggers an immediate out-of-band refresh before the request is
// failed, which is what makes key rotation downtime-free.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::models::JwksDocument;
use crate::services::keystore::KeyStore;
use crate::services::token::{TokenError, TokenService, VerificationKeySet};
use crate::models::AccessTokenClaims;

/// Errors for key set distribution
#[derive(Error, Debug)]
pub enum JwksError {
    #[error("Key set fetch failed: {0}")]
    Fetch(String),

    #[error("Key set document unusable: {0}")]
    Decode(String),

    #[error("Cached key set exceeded its maximum staleness")]
    Stale,

    #[error("No key set available")]
    Empty,
}

/// Verification failure at the validator: either the token itself is bad
/// (401 territory) or the trust infrastructure is (503 territory).
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Upstream(#[from] JwksError),
}

/// Where the key set comes from
enum JwksSource {
    /// Remote validators fetch the well-known endpoint
    Http {
        url: String,
        client: reqwest::Client,
    },
    /// The Authority itself reads its own key store, no network hop
    Local(Arc<KeyStore>),
    /// Fixed document, used by tests and static deployments
    Static(JwksDocument),
}

struct Snapshot {
    key_set: Arc<VerificationKeySet>,
    fetched_at: Instant,
}

/// Shared key-set cache with periodic background refresh
pub struct JwksCache {
    source: JwksSource,
    snapshot: RwLock<Option<Snapshot>>,
    refresh_interval: Duration,
    max_stale: Duration,
}

impl JwksCache {
    pub fn new_http(
        url: String,
        fetch_timeout: Duration,
        refresh_interval: Duration,
        max_stale: Duration,
    ) -> Result<Self, JwksError> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| JwksError::Fetch(e.to_string()))?;

        Ok(Self {
            source: JwksSource::Http { url, client },
            snapshot: RwLock::new(None),
            refresh_interval,
            max_stale,
        })
    }

    pub fn new_local(
        keystore: Arc<KeyStore>,
        refresh_interval: Duration,
        max_stale: Duration,
    ) -> Self {
        Self {
            source: JwksSource::Local(keystore),
            snapshot: RwLock::new(None),
            refresh_interval,
            max_stale,
        }
    }

    pub fn from_document(document: JwksDocument, max_stale: Duration) -> Result<Self, JwksError> {
        let key_set =
            VerificationKeySet::from_jwks(&document).map_err(|e| JwksError::Decode(e.to_string()))?;

        Ok(Self {
            source: JwksSource::Static(document),
            snapshot: RwLock::new(Some(Snapshot {
                key_set: Arc::new(key_set),
                fetched_at: Instant::now(),
            })),
            refresh_interval: Duration::from_secs(300),
            max_stale,
        })
    }

    async fn fetch_document(&self) -> Result<JwksDocument, JwksError> {
        match &self.source {
            JwksSource::Http { url, client } => client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| JwksError::Fetch(e.to_string()))?
                .json::<JwksDocument>()
                .await
                .map_err(|e| JwksError::Decode(e.to_string())),
            JwksSource::Local(keystore) => keystore
                .jwks_document(chrono::Utc::now())
                .await
                .map_err(|e| JwksError::Fetch(e.to_string())),
            JwksSource::Static(document) => Ok(document.clone()),
        }
    }

    /// Replace the snapshot with a freshly fetched key set
    pub async fn refresh_now(&self) -> Result<(), JwksError> {
        let document = self.fetch_document().await?;
        if document.keys.is_empty() {
            return Err(JwksError::Empty);
        }

        let key_set =
            VerificationKeySet::from_jwks(&document).map_err(|e| JwksError::Decode(e.to_string()))?;

        let mut snapshot = self.snapshot.write().await;
        *snapshot = Some(Snapshot {
            key_set: Arc::new(key_set),
            fetched_at: Instant::now(),
        });

        Ok(())
    }

    /// The current trusted key set. A fetch failure falls back to the
    /// previous snapshot until it exceeds `max_stale`.
    pub async fn key_set(&self) -> Result<Arc<VerificationKeySet>, JwksError> {
        {
            let snapshot = self.snapshot.read().await;
            if let Some(snap) = snapshot.as_ref() {
                if snap.fetched_at.elapsed() <= self.max_stale {
                    return Ok(snap.key_set.clone());
                }
            }
        }

        match self.refresh_now().await {
            Ok(()) => {
                let snapshot = self.snapshot.read().await;
                snapshot
                    .as_ref()
                    .map(|s| s.key_set.clone())
                    .ok_or(JwksError::Empty)
            },
            Err(e) => {
                let snapshot = self.snapshot.read().await;
                match snapshot.as_ref() {
                    Some(snap) if snap.fetched_at.elapsed() <= self.max_stale => {
                        Ok(snap.key_set.clone())
                    },
                    Some(_) => {
                        warn!("Key set snapshot beyond max staleness and refresh failed: {}", e);
                        Err(JwksError::Stale)
                    },
                    None => Err(e),
                }
            },
        }
    }

    /// Verify a token against the cached key set. UnknownKid forces one
    /// immediate refresh and a retry, so a validator accepts tokens signed
    /// by a key published after its last periodic refresh.
    pub async fn verify(&self, token: &str, now: u64) -> Result<AccessTokenClaims, VerifyError> {
        let key_set = self.key_set().await?;

        match TokenService::verify(token, &key_set, now) {
            Err(TokenError::UnknownKid(kid)) => {
                info!(kid = %kid, "Unknown kid, forcing key set refresh");
                self.refresh_now().await?;
                let key_set = self.key_set().await?;
                TokenService::verify(token, &key_set, now).map_err(VerifyError::Token)
            },
            other => other.map_err(VerifyError::Token),
        }
    }

    /// Periodic background refresh. Failures keep the previous snapshot
    /// authoritative and are logged once per tick.
    pub fn spawn_refresh(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.refresh_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = cache.refresh_now().await {
                    warn!("Background key set refresh failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewSigningKey, Role, SigningKey};
    use chrono::Utc;
    use uuid::Uuid;

    fn make_key() -> SigningKey {
        let generated = NewSigningKey::generate(None).expect("keygen");
        SigningKey {
            id: Uuid::new_v4(),
            kid: generated.kid,
            public_key_pem: generated.public_key_pem,
            private_key_pem: generated.private_key_pem,
            algorithm: generated.algorithm,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_static_cache_verifies_tokens() {
        let key = make_key();
        let document = JwksDocument {
            keys: vec![key.to_jwk().expect("jwk")],
        };
        let cache =
            JwksCache::from_document(document, Duration::from_secs(86_400)).expect("cache");

        let svc = TokenService::new("test".to_string(), 7200);
        let now = 1_700_000_000u64;
        let token = svc
            .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], &key, now)
            .expect("mint");

        assert!(cache.verify(&token, now).await.is_ok());
        assert!(matches!(
            cache.verify(&token, now + 10_000).await,
            Err(VerifyError::Token(TokenError::Expired))
        ));
    }

    #[tokio::test]
    async fn test_unknown_kid_stays_unknown_for_static_source() {
        // static source re-serves the same document, so the forced refresh
        // cannot learn the stranger's kid and the request fails
        let trusted = make_key();
        let stranger = make_key();

        let document = JwksDocument {
            keys: vec![trusted.to_jwk().expect("jwk")],
        };
        let cache =
            JwksCache::from_document(document, Duration::from_secs(86_400)).expect("cache");

        let svc = TokenService::new("test".to_string(), 7200);
        let now = 1_700_000_000u64;
        let token = svc
            .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], &stranger, now)
            .expect("mint");

        assert!(matches!(
            cache.verify(&token, now).await,
            Err(VerifyError::Token(TokenError::UnknownKid(_)))
        ));
    }

    #[tokio::test]
    async fn test_key_set_exposes_all_published_kids() {
        let k1 = make_key();
        let k2 = make_key();
        let document = JwksDocument {
            keys: vec![k1.to_jwk().expect("jwk"), k2.to_jwk().expect("jwk")],
        };
        let cache =
            JwksCache::from_document(document, Duration::from_secs(86_400)).expect("cache");

        let key_set = cache.key_set().await.expect("key set");
        assert_eq!(key_set.len(), 2);
        assert!(key_set.contains(&k1.kid));
        assert!(key_set.contains(&k2.kid));
    }
}
