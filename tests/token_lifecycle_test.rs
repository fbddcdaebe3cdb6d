// Token lifecycle against the public API: mint, verify, rotate, revoke-window
// No database or revocation store required.

use bazaar_identity_core::models::{NewSigningKey, SigningKey};
use bazaar_identity_core::{JwksDocument, Role, TokenError, TokenService, VerificationKeySet};
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

const NOW: u64 = 1_700_000_000;

#[test]
fn test_token_valid_exactly_within_issuance_window() {
    // verify(T, K, t) = true iff iat <= t < iat+d and T's kid is in K
    let key = make_key();
    let svc = TokenService::new("bazaar.market".to_string(), 7200);
    let token = svc
        .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], &key, NOW)
        .expect("mint");
    let key_set = VerificationKeySet::from_signing_keys(&[key]).expect("set");

    assert!(TokenService::verify(&token, &key_set, NOW).is_ok());
    assert!(TokenService::verify(&token, &key_set, NOW + 7199).is_ok());
    assert!(matches!(
        TokenService::verify(&token, &key_set, NOW + 7200),
        Err(TokenError::Expired)
    ));
}

#[test]
fn test_published_key_set_roundtrip() {
    // a token minted by the Authority's primary key is accepted by a
    // validator that only ever saw the published JWKS document
    let key = make_key();
    let svc = TokenService::new("bazaar.market".to_string(), 7200);
    let token = svc
        .mint_access(
            Uuid::new_v4(),
            Uuid::new_v4(),
            &[Role::Seller, Role::Admin],
            &key,
            NOW,
        )
        .expect("mint");

    let published = JwksDocument {
        keys: vec![key.to_jwk().expect("jwk")],
    };
    // simulate the wire: document serialized by the Authority, parsed by
    // the validator
    let serialized = serde_json::to_string(&published).expect("serialize");
    let received: JwksDocument = serde_json::from_str(&serialized).expect("parse");

    let key_set = VerificationKeySet::from_jwks(&received).expect("set");
    let claims = TokenService::verify(&token, &key_set, NOW).expect("verify");
    assert_eq!(claims.roles, vec!["SELLER", "ADMIN"]);
}

#[test]
fn test_jwks_document_shape_on_the_wire() {
    let key = make_key();
    let document = JwksDocument {
        keys: vec![key.to_jwk().expect("jwk")],
    };

    let value = serde_json::to_value(&document).expect("serialize");
    let keys = value["keys"].as_array().expect("keys array");
    assert_eq!(keys.len(), 1);

    let entry = &keys[0];
    assert_eq!(entry["kty"], "RSA");
    assert_eq!(entry["use"], "sig");
    assert_eq!(entry["alg"], "RS256");
    assert_eq!(entry["kid"], key.kid);
    // base64url without padding
    let n = entry["n"].as_str().expect("n");
    let e = entry["e"].as_str().expect("e");
    assert!(!n.contains('=') && !n.contains('+') && !n.contains('/'));
    assert!(!e.contains('='));
}

#[test]
fn test_key_rotation_mid_flight() {
    // scenario: T minted under K1; K2 published as primary while K1 is
    // still unexpired; T keeps verifying until K1 leaves the active set
    let now_dt = Utc::now();
    let mut k1 = make_key();
    k1.created_at = now_dt - chrono::Duration::days(60);
    k1.expires_at = Some(now_dt + chrono::Duration::days(30));

    let mut k2 = make_key();
    k2.created_at = now_dt;
    k2.expires_at = Some(now_dt + chrono::Duration::days(90));

    let keys = vec![k1.clone(), k2.clone()];

    // selection policy: K2 is now primary
    let primary = SigningKey::select_primary(&keys, now_dt).expect("primary");
    assert_eq!(primary.kid, k2.kid);

    let svc = TokenService::new("bazaar.market".to_string(), 7200);
    let old_token = svc
        .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], &k1, NOW)
        .expect("mint");
    let new_token = svc
        .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], primary, NOW)
        .expect("mint");

    // both keys are in the active overlap window
    let active: Vec<SigningKey> = keys
        .iter()
        .filter(|k| k.is_active_at(now_dt))
        .cloned()
        .collect();
    assert_eq!(active.len(), 2);

    let key_set = VerificationKeySet::from_signing_keys(&active).expect("set");
    assert!(TokenService::verify(&old_token, &key_set, NOW).is_ok());
    assert!(TokenService::verify(&new_token, &key_set, NOW).is_ok());

    // after K1's expiry passes, only K2 remains active
    let later = now_dt + chrono::Duration::days(31);
    let remaining: Vec<SigningKey> = keys
        .iter()
        .filter(|k| k.is_active_at(later))
        .cloned()
        .collect();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].kid, k2.kid);

    let rotated_set = VerificationKeySet::from_signing_keys(&remaining).expect("set");
    assert!(matches!(
        TokenService::verify(&old_token, &rotated_set, NOW),
        Err(TokenError::UnknownKid(_))
    ));
    assert!(TokenService::verify(&new_token, &rotated_set, NOW).is_ok());
}

#[test]
fn test_tampered_token_rejected() {
    let key = make_key();
    let svc = TokenService::new("bazaar.market".to_string(), 7200);
    let token = svc
        .mint_access(Uuid::new_v4(), Uuid::nil(), &[Role::Customer], &key, NOW)
        .expect("mint");
    let key_set = VerificationKeySet::from_signing_keys(&[key]).expect("set");

    // flip the payload: claims change, signature stays
    let mut parts: Vec<&str> = token.split('.').collect();
    let forged_payload = {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        let decoded = URL_SAFE_NO_PAD.decode(parts[1]).expect("payload");
        let mut claims: serde_json::Value = serde_json::from_slice(&decoded).expect("json");
        claims["roles"] = serde_json::json!(["ADMIN"]);
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("ser"))
    };
    parts[1] = &forged_payload;
    let forged = parts.join(".");

    assert!(matches!(
        TokenService::verify(&forged, &key_set, NOW),
        Err(TokenError::BadSignature)
    ));
}
