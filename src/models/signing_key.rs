// Signing key database model
// Asymmetric RS256 key pairs with overlap-based rotation: old keys keep
// verifying already-issued tokens until their expiry passes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::signing_keys;

const RSA_KEY_BITS: usize = 2048;

/// Signing key database model. Private material never leaves the
/// Authority process; only the public components are published.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = signing_keys)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SigningKey {
    pub id: Uuid,
    pub kid: String,
    pub public_key_pem: String,
    pub private_key_pem: String,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// New signing key for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = signing_keys)]
pub struct NewSigningKey {
    pub kid: String,
    pub public_key_pem: String,
    pub private_key_pem: String,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// One published verification key in the JWKS document. Components are
/// base64url without padding; integers are big-endian with no leading zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JwkKey {
    pub kty: String,
    pub kid: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub alg: String,
    pub n: String,
    pub e: String,
}

/// The public key set served at the well-known endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JwksDocument {
    pub keys: Vec<JwkKey>,
}

/// Errors for signing key operations
#[derive(thiserror::Error, Debug)]
pub enum SigningKeyError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Key generation failed: {0}")]
    Generation(String),

    #[error("Key material unparseable: {0}")]
    Malformed(String),
}

impl NewSigningKey {
    /// Generate a fresh RSA key pair with a random kid. Serialized as
    /// PKCS#8 / SPKI PEM for storage.
    pub fn generate(expires_at: Option<DateTime<Utc>>) -> Result<Self, SigningKeyError> {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| SigningKeyError::Generation(e.to_string()))?;

        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| SigningKeyError::Generation(e.to_string()))?
            .to_string();
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SigningKeyError::Generation(e.to_string()))?;

        Ok(NewSigningKey {
            kid: Uuid::new_v4().simple().to_string(),
            public_key_pem: public_pem,
            private_key_pem: private_pem,
            algorithm: "RS256".to_string(),
            created_at: Utc::now(),
            expires_at,
        })
    }
}

impl SigningKey {
    /// A key is active while its expiry is null or strictly in the future
    pub fn is_active_at(&self, t: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expiry) => expiry > t,
        }
    }

    /// Selection policy for signing: the most recently created active key
    pub fn select_primary(keys: &[SigningKey], t: DateTime<Utc>) -> Option<&SigningKey> {
        keys.iter()
            .filter(|k| k.is_active_at(t))
            .max_by_key(|k| k.created_at)
    }

    /// Export the public components as a JWK entry
    pub fn to_jwk(&self) -> Result<JwkKey, SigningKeyError> {
        let public = RsaPublicKey::from_public_key_pem(&self.public_key_pem)
            .map_err(|e| SigningKeyError::Malformed(e.to_string()))?;

        Ok(JwkKey {
            kty: "RSA".to_string(),
            kid: self.kid.clone(),
            use_: "sig".to_string(),
            alg: self.algorithm.clone(),
            n: URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        })
    }

    /// All keys active at `t`, most recent first
    pub async fn active_at(
        conn: &mut AsyncPgConnection,
        t: DateTime<Utc>,
    ) -> Result<Vec<Self>, SigningKeyError> {
        use crate::schema::signing_keys::dsl::*;

        signing_keys
            .filter(expires_at.is_null().or(expires_at.gt(t)))
            .order(created_at.desc())
            .load::<SigningKey>(conn)
            .await
            .map_err(SigningKeyError::Database)
    }

    /// Persist a newly generated key
    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_key: NewSigningKey,
    ) -> Result<Self, SigningKeyError> {
        use crate::schema::signing_keys::dsl::*;

        diesel::insert_into(signing_keys)
            .values(&new_key)
            .get_result::<SigningKey>(conn)
            .await
            .map_err(SigningKeyError::Database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key_with(created: DateTime<Utc>, expires: Option<DateTime<Utc>>) -> SigningKey {
        let generated = NewSigningKey::generate(expires).expect("keygen");
        SigningKey {
            id: Uuid::new_v4(),
            kid: generated.kid,
            public_key_pem: generated.public_key_pem,
            private_key_pem: generated.private_key_pem,
            algorithm: generated.algorithm,
            created_at: created,
            expires_at: expires,
        }
    }

    #[test]
    fn test_active_window() {
        let now = Utc::now();
        let unexpiring = key_with(now, None);
        let live = key_with(now, Some(now + Duration::days(90)));
        let dead = key_with(now - Duration::days(120), Some(now - Duration::days(30)));

        assert!(unexpiring.is_active_at(now));
        assert!(live.is_active_at(now));
        assert!(!dead.is_active_at(now));
        // strictly-after semantics: a key is not active at its exact expiry
        assert!(!live.is_active_at(now + Duration::days(90)));
    }

    #[test]
    fn test_primary_is_most_recently_created_active() {
        let now = Utc::now();
        let older = key_with(now - Duration::days(60), Some(now + Duration::days(30)));
        let newer = key_with(now - Duration::days(1), Some(now + Duration::days(89)));
        let expired = key_with(now, Some(now - Duration::seconds(1)));

        let keys = vec![older.clone(), expired, newer.clone()];
        let primary = SigningKey::select_primary(&keys, now).expect("primary");
        assert_eq!(primary.kid, newer.kid);

        // once the newer key lapses, the older one takes over
        let later = now + Duration::days(95);
        let primary = SigningKey::select_primary(&keys, later);
        assert!(primary.is_none() || primary.unwrap().kid != newer.kid);
    }

    #[test]
    fn test_jwk_export_components() {
        let now = Utc::now();
        let key = key_with(now, None);
        let jwk = key.to_jwk().expect("jwk");

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.use_, "sig");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.kid, key.kid);
        // base64url without padding
        assert!(!jwk.n.contains('='));
        assert!(!jwk.e.contains('='));
        // 2048-bit modulus: 256 bytes -> 342/343 base64url chars, no leading zero
        let n_bytes = URL_SAFE_NO_PAD.decode(&jwk.n).expect("n decodes");
        assert_eq!(n_bytes.len(), 256);
        assert_ne!(n_bytes[0], 0);
        // common exponent 65537
        let e_bytes = URL_SAFE_NO_PAD.decode(&jwk.e).expect("e decodes");
        assert_eq!(e_bytes, vec![0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_generated_kids_are_unique() {
        let a = NewSigningKey::generate(None).expect("keygen");
        let b = NewSigningKey::generate(None).expect("keygen");
        assert_ne!(a.kid, b.kid);
    }
}
