// Token minting and verification
// Access tokens are short-lived RS256 JWTs carrying the kid of the signing
// key; refresh tokens are opaque high-entropy strings that never leave the
// client except to be hashed and looked up.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AccessTokenClaims, JwksDocument, Role, SigningKey};

/// Bytes of entropy in an opaque refresh token (256 bits)
const REFRESH_TOKEN_BYTES: usize = 32;

/// Errors for token operations
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token expired")]
    Expired,

    #[error("Unknown signing key: {0}")]
    UnknownKid(String),

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Key material unusable: {0}")]
    KeyMaterial(String),
}

/// The set of verification keys a validator currently trusts, indexed by kid.
/// Built either from the published JWKS document (gateway, backend kernels)
/// or straight from the key store (the Authority itself).
pub struct VerificationKeySet {
    keys: HashMap<String, DecodingKey>,
}

impl VerificationKeySet {
    /// Build from a published key set document (n/e components)
    pub fn from_jwks(document: &JwksDocument) -> Result<Self, TokenError> {
        let mut keys = HashMap::new();
        for jwk in &document.keys {
            let decoding = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
                .map_err(|e| TokenError::KeyMaterial(e.to_string()))?;
            keys.insert(jwk.kid.clone(), decoding);
        }
        Ok(Self { keys })
    }

    /// Build from stored signing keys (public PEM side only)
    pub fn from_signing_keys(signing_keys: &[SigningKey]) -> Result<Self, TokenError> {
        let mut keys = HashMap::new();
        for key in signing_keys {
            let decoding = DecodingKey::from_rsa_pem(key.public_key_pem.as_bytes())
                .map_err(|e| TokenError::KeyMaterial(e.to_string()))?;
            keys.insert(key.kid.clone(), decoding);
        }
        Ok(Self { keys })
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }
}

/// Token minting service
pub struct TokenService {
    issuer: String,
    access_ttl: u64,
}

impl TokenService {
    pub fn new(issuer: String, access_ttl: u64) -> Self {
        Self { issuer, access_ttl }
    }

    pub fn access_ttl(&self) -> u64 {
        self.access_ttl
    }

    /// Mint a signed access token with a fresh jti, stamped with the
    /// signing key's kid so validators can select the right public key
    /// across rotations.
    pub fn mint_access(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        roles: &[Role],
        key: &SigningKey,
        now: u64,
    ) -> Result<String, TokenError> {
        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            roles: roles.iter().map(|r| r.as_str().to_string()).collect(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.access_ttl,
            iss: self.issuer.clone(),
        };

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key_pem.as_bytes())
            .map_err(|e| TokenError::KeyMaterial(e.to_string()))?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid.clone());

        encode(&header, &claims, &encoding_key).map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Mint an opaque refresh token: 256 bits of OS randomness,
    /// base64url without padding.
    pub fn mint_refresh() -> String {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Parse header and claims without verifying the signature. Used where
    /// verification is intrinsic to the flow (e.g. the Authority computing
    /// a remaining TTL it will re-check anyway).
    pub fn parse_unverified(token: &str) -> Result<AccessTokenClaims, TokenError> {
        let mut parts = token.split('.');
        let (_header, payload) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(_sig), None) => (h, p),
            _ => return Err(TokenError::Malformed),
        };

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;

        serde_json::from_slice::<AccessTokenClaims>(&payload_bytes)
            .map_err(|_| TokenError::Malformed)
    }

    /// Verify signature and expiry against a caller-supplied clock. The
    /// expiry check runs against `now` rather than the system clock so the
    /// validity window is testable and replayable.
    pub fn verify(
        token: &str,
        key_set: &VerificationKeySet,
        now: u64,
    ) -> Result<AccessTokenClaims, TokenError> {
        let header = decode_header(token).map_err(|_| TokenError::Malformed)?;
        let kid = header.kid.ok_or(TokenError::Malformed)?;

        let decoding_key = key_set
            .get(&kid)
            .ok_or_else(|| TokenError::UnknownKid(kid.clone()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = Default::default();

        let token_data =
            decode::<AccessTokenClaims>(token, decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::BadSignature,
                    _ => TokenError::Malformed,
                }
            })?;

        if token_data.claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        Ok(token_data.claims)
    }

    /// The revocation handle of a token
    pub fn extract_jti(token: &str) -> Result<String, TokenError> {
        Self::parse_unverified(token).map(|c| c.jti)
    }

    /// The subject of a token
    pub fn extract_sub(token: &str) -> Result<String, TokenError> {
        Self::parse_unverified(token).map(|c| c.sub)
    }

    /// Seconds of validity left at `now`; used as the blacklist TTL
    pub fn remaining_ttl(token: &str, now: u64) -> Result<u64, TokenError> {
        Self::parse_unverified(token).map(|c| c.remaining_ttl_at(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewSigningKey;
    use chrono::Utc;

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

    fn service() -> TokenService {
        TokenService::new("test.bazaar.market".to_string(), 7200)
    }

    #[test]
    fn test_mint_and_verify_roundtrip() {
        let key = make_key();
        let svc = service();
        let now = 1_700_000_000u64;

        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        let token = svc
            .mint_access(user_id, tenant_id, &[Role::Customer, Role::Seller], &key, now)
            .expect("mint");

        let key_set = VerificationKeySet::from_signing_keys(&[key]).expect("key set");
        let claims = TokenService::verify(&token, &key_set, now).expect("verify");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.tenant_id, tenant_id.to_string());
        assert_eq!(claims.roles, vec!["CUSTOMER", "SELLER"]);
        assert_eq!(claims.iat, now);
        assert_eq!(claims.exp, now + 7200);
        assert_eq!(claims.iss, "test.bazaar.market");
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn test_verify_against_published_components() {
        // a validator that only ever saw the JWKS document accepts the token
        let key = make_key();
        let svc = service();
        let now = 1_700_000_000u64;

        let token = svc
            .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], &key, now)
            .expect("mint");

        let document = JwksDocument {
            keys: vec![key.to_jwk().expect("jwk")],
        };
        let key_set = VerificationKeySet::from_jwks(&document).expect("key set");

        assert!(TokenService::verify(&token, &key_set, now).is_ok());
    }

    #[test]
    fn test_expiry_window_is_caller_clocked() {
        let key = make_key();
        let svc = service();
        let now = 1_700_000_000u64;

        let token = svc
            .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], &key, now)
            .expect("mint");
        let key_set = VerificationKeySet::from_signing_keys(std::slice::from_ref(&key)).expect("key set");

        // valid through the whole window
        assert!(TokenService::verify(&token, &key_set, now).is_ok());
        assert!(TokenService::verify(&token, &key_set, now + 7199).is_ok());

        // virtual time past the TTL
        assert!(matches!(
            TokenService::verify(&token, &key_set, now + 7200),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            TokenService::verify(&token, &key_set, now + 100_000),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_unknown_kid_rejected() {
        let signing = make_key();
        let stranger = make_key();
        let svc = service();
        let now = 1_700_000_000u64;

        let token = svc
            .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], &signing, now)
            .expect("mint");

        let key_set = VerificationKeySet::from_signing_keys(&[stranger]).expect("key set");
        match TokenService::verify(&token, &key_set, now) {
            Err(TokenError::UnknownKid(kid)) => assert_eq!(kid, signing.kid),
            other => panic!("expected UnknownKid, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_signature_rejected() {
        // two distinct keys that happen to share a kid: signature must fail
        let signer = make_key();
        let mut imposter = make_key();
        imposter.kid = signer.kid.clone();

        let svc = service();
        let now = 1_700_000_000u64;
        let token = svc
            .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], &signer, now)
            .expect("mint");

        let key_set = VerificationKeySet::from_signing_keys(&[imposter]).expect("key set");
        assert!(matches!(
            TokenService::verify(&token, &key_set, now),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_rotation_overlap() {
        // token minted under k1 verifies while k1 is still in the set,
        // and new tokens carry k2's kid
        let k1 = make_key();
        let k2 = make_key();
        let svc = service();
        let now = 1_700_000_000u64;

        let old_token = svc
            .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], &k1, now)
            .expect("mint");
        let new_token = svc
            .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], &k2, now)
            .expect("mint");

        let overlap =
            VerificationKeySet::from_signing_keys(&[k1.clone(), k2.clone()]).expect("key set");
        assert!(TokenService::verify(&old_token, &overlap, now).is_ok());
        assert!(TokenService::verify(&new_token, &overlap, now).is_ok());

        // after k1 is dropped from the set, its tokens stop verifying
        let rotated = VerificationKeySet::from_signing_keys(&[k2]).expect("key set");
        assert!(matches!(
            TokenService::verify(&old_token, &rotated, now),
            Err(TokenError::UnknownKid(_))
        ));
        assert!(TokenService::verify(&new_token, &rotated, now).is_ok());
    }

    #[test]
    fn test_malformed_inputs() {
        let key = make_key();
        let key_set = VerificationKeySet::from_signing_keys(&[key]).expect("key set");

        for garbage in ["", "abc", "a.b", "a.b.c.d", "!!!.###.$$$"] {
            assert!(matches!(
                TokenService::verify(garbage, &key_set, 0),
                Err(TokenError::Malformed)
            ));
            assert!(matches!(
                TokenService::parse_unverified(garbage),
                Err(TokenError::Malformed)
            ));
        }
    }

    #[test]
    fn test_parse_unverified_and_helpers() {
        let key = make_key();
        let svc = service();
        let now = 1_700_000_000u64;

        let token = svc
            .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Admin], &key, now)
            .expect("mint");

        let claims = TokenService::parse_unverified(&token).expect("parse");
        assert_eq!(TokenService::extract_jti(&token).expect("jti"), claims.jti);
        assert_eq!(TokenService::extract_sub(&token).expect("sub"), claims.sub);
        assert_eq!(
            TokenService::remaining_ttl(&token, now + 200).expect("ttl"),
            7000
        );
        assert_eq!(
            TokenService::remaining_ttl(&token, now + 10_000).expect("ttl"),
            0
        );
    }

    #[test]
    fn test_refresh_tokens_are_opaque_and_unique() {
        let a = TokenService::mint_refresh();
        let b = TokenService::mint_refresh();

        assert_ne!(a, b);
        // 32 bytes -> 43 base64url chars, no padding
        assert_eq!(a.len(), 43);
        assert!(!a.contains('='));
        assert!(URL_SAFE_NO_PAD.decode(&a).is_ok());
    }

    #[test]
    fn test_jti_unique_per_issuance() {
        let key = make_key();
        let svc = service();
        let now = 1_700_000_000u64;
        let user = Uuid::new_v4();

        let t1 = svc
            .mint_access(user, Uuid::nil(), &[Role::Customer], &key, now)
            .expect("mint");
        let t2 = svc
            .mint_access(user, Uuid::nil(), &[Role::Customer], &key, now)
            .expect("mint");

        assert_ne!(
            TokenService::extract_jti(&t1).expect("jti"),
            TokenService::extract_jti(&t2).expect("jti")
        );
    }
}
