// Auth orchestrator: Register / Login / Refresh / Logout / LogoutAll
// Composes the password service, key store, token minter, identity store
// and revocation index. Every credential precondition failure collapses
// into BadCredentials so responses cannot be used to enumerate users.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Duration, Utc};
use diesel_async::AsyncConnection;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::db::DieselPool;
use crate::models::{
    AccessTokenClaims, NewUser, RefreshToken, Role, RoleGrant, Tenant, User, DEFAULT_TENANT_ID,
};
use crate::services::keystore::KeyStore;
use crate::services::password::PasswordService;
use crate::services::revocation::RevocationIndex;
use crate::services::token::{TokenService, VerificationKeySet};
use crate::utils::auth_errors::AuthError;
use crate::utils::validation::{is_valid_e164, is_valid_email};

/// Register flow input
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: String,
    pub tenant_id: Option<Uuid>,
    pub role: Role,
}

/// Login flow input
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password: String,
}

/// Token pair plus the identity it was issued to
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    /// Cleartext, returned to the client exactly once
    pub refresh_token: String,
    pub expires_in: u64,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub roles: Vec<Role>,
}

/// How register resolves the target tenant for a role
#[derive(Debug, PartialEq, Eq)]
pub enum TenantStrategy {
    Explicit(Uuid),
    Default,
    CreateForSeller,
    Reject,
}

/// Pure tenant-resolution policy: an explicit tenant always wins;
/// customers land in the default marketplace tenant; a self-registering
/// seller gets a tenant of their own; every other role must name one.
pub fn tenant_strategy(role: Role, explicit: Option<Uuid>) -> TenantStrategy {
    match (explicit, role) {
        (Some(id), _) => TenantStrategy::Explicit(id),
        (None, Role::Customer) => TenantStrategy::Default,
        (None, Role::Seller) => TenantStrategy::CreateForSeller,
        (None, _) => TenantStrategy::Reject,
    }
}

/// Auth orchestrator service
pub struct AuthService {
    pool: DieselPool,
    password: Arc<PasswordService>,
    tokens: TokenService,
    keystore: Arc<KeyStore>,
    revocation: Arc<RevocationIndex>,
    refresh_ttl: u64,
}

impl AuthService {
    pub fn new(
        pool: DieselPool,
        password: Arc<PasswordService>,
        tokens: TokenService,
        keystore: Arc<KeyStore>,
        revocation: Arc<RevocationIndex>,
        refresh_ttl: u64,
    ) -> Self {
        Self {
            pool,
            password,
            tokens,
            keystore,
            revocation,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> u64 {
        self.tokens.access_ttl()
    }

    pub fn refresh_ttl(&self) -> u64 {
        self.refresh_ttl
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
        AuthError,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// The KDF is CPU-heavy (hundreds of ms); it runs on the blocking pool
    /// so request workers are not starved.
    async fn hash_password_pooled(
        &self,
        password: String,
        salt: Vec<u8>,
    ) -> Result<String, AuthError> {
        let svc = Arc::clone(&self.password);
        tokio::task::spawn_blocking(move || svc.hash(&password, &salt))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?
            .map_err(AuthError::from)
    }

    async fn verify_password_pooled(
        &self,
        password: String,
        stored_hash: String,
        salt: Vec<u8>,
    ) -> Result<bool, AuthError> {
        let svc = Arc::clone(&self.password);
        tokio::task::spawn_blocking(move || svc.verify(&password, &stored_hash, &salt))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Verify an access token the Authority itself received. The Authority
    /// reads its own key store, so no published-key round trip is needed.
    pub async fn verify_access(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        let now = Utc::now();
        let keys = self.keystore.active_keys_at(now).await?;
        let key_set =
            VerificationKeySet::from_signing_keys(&keys).map_err(AuthError::from)?;
        TokenService::verify(token, &key_set, now.timestamp() as u64).map_err(AuthError::from)
    }

    fn validate_identifiers(
        email: &Option<String>,
        phone: &Option<String>,
    ) -> Result<(), AuthError> {
        if email.is_none() && phone.is_none() {
            return Err(AuthError::invalid_field(
                "email",
                "either email or phone is required",
            ));
        }
        if let Some(email) = email {
            if !is_valid_email(email) {
                return Err(AuthError::invalid_field("email", "invalid email syntax"));
            }
        }
        if let Some(phone) = phone {
            if !is_valid_e164(phone) {
                return Err(AuthError::invalid_field(
                    "phone",
                    "phone must be E.164 (+<country><number>)",
                ));
            }
        }
        Ok(())
    }

    /// Register a new account and issue its first token pair. Steps 1-6
    /// commit transactionally; a minting failure rolls everything back.
    pub async fn register(&self, input: RegisterInput) -> Result<IssuedTokens, AuthError> {
        Self::validate_identifiers(&input.email, &input.phone)?;
        if input.password.is_empty() {
            return Err(AuthError::invalid_field("password", "password is required"));
        }

        // Salt + KDF before the transaction: pure CPU, no identity state
        let salt = self.password.generate_salt();
        let password_hash = self
            .hash_password_pooled(input.password.clone(), salt.clone())
            .await?;
        let salt_b64 = BASE64.encode(&salt);

        let now = Utc::now();
        let signing_key = self
            .keystore
            .primary_signing_key_at(now)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let tokens = &self.tokens;
        let refresh_ttl = self.refresh_ttl;
        let password_svc = Arc::clone(&self.password);

        let mut conn = self.conn().await?;
        let issued = conn
            .transaction::<IssuedTokens, AuthError, _>(|tx| {
                Box::pin(async move {
                    let registrant_id = input
                        .email
                        .clone()
                        .or_else(|| input.phone.clone())
                        .unwrap_or_default();

                    let tenant = match tenant_strategy(input.role, input.tenant_id) {
                        TenantStrategy::Explicit(id) => {
                            let tenant = Tenant::find_by_id(tx, id).await?;
                            if !tenant.is_active() {
                                return Err(AuthError::InvalidTenant(
                                    "tenant is inactive".to_string(),
                                ));
                            }
                            tenant
                        },
                        TenantStrategy::Default => Tenant::find_by_id(tx, DEFAULT_TENANT_ID)
                            .await
                            .map_err(|_| {
                                AuthError::Internal(
                                    "default marketplace tenant missing, bootstrap incomplete"
                                        .to_string(),
                                )
                            })?,
                        TenantStrategy::CreateForSeller => {
                            Tenant::create(tx, &registrant_id).await?
                        },
                        TenantStrategy::Reject => {
                            return Err(AuthError::InvalidTenant(format!(
                                "tenant id required for role {}",
                                input.role
                            )));
                        },
                    };

                    let now = Utc::now();
                    let user = User::create(
                        tx,
                        NewUser {
                            email: input.email.clone(),
                            phone: input.phone.clone(),
                            password_hash,
                            salt: salt_b64,
                            tenant_id: tenant.id,
                            enabled: true,
                            email_verified: false,
                            phone_verified: false,
                            created_at: now,
                            updated_at: now,
                        },
                    )
                    .await?;

                    RoleGrant::grant(tx, user.id, input.role).await?;

                    let now_ts = now.timestamp() as u64;
                    let access_token = tokens
                        .mint_access(user.id, tenant.id, &[input.role], &signing_key, now_ts)
                        .map_err(AuthError::from)?;

                    let refresh_token = TokenService::mint_refresh();
                    let refresh_hash = password_svc.token_lookup_key(&refresh_token);
                    RefreshToken::store(
                        tx,
                        user.id,
                        &refresh_hash,
                        now + Duration::seconds(refresh_ttl as i64),
                    )
                    .await?;

                    Ok(IssuedTokens {
                        access_token,
                        refresh_token,
                        expires_in: tokens.access_ttl(),
                        user_id: user.id,
                        tenant_id: tenant.id,
                        roles: vec![input.role],
                    })
                })
            })
            .await?;

        info!(user_id = %issued.user_id, tenant_id = %issued.tenant_id, "Registered new account");
        Ok(issued)
    }

    /// Authenticate by email or phone and issue a token pair.
    ///
    /// The composite unique key is (identifier, tenant_id), so one address
    /// may resolve to an account per tenant; the password decides which one
    /// the caller is. Every failure is BadCredentials.
    pub async fn login(&self, input: LoginInput) -> Result<IssuedTokens, AuthError> {
        let mut conn = self.conn().await?;

        let candidates = match (&input.email, &input.phone) {
            (Some(email), _) => User::find_by_email(&mut conn, email).await?,
            (None, Some(phone)) => User::find_by_phone(&mut conn, phone).await?,
            (None, None) => return Err(AuthError::BadCredentials),
        };

        if candidates.is_empty() {
            return Err(AuthError::BadCredentials);
        }

        let mut matched: Option<User> = None;
        for candidate in candidates {
            let salt = BASE64
                .decode(&candidate.salt)
                .map_err(|e| AuthError::Internal(format!("stored salt undecodable: {}", e)))?;
            if self
                .verify_password_pooled(
                    input.password.clone(),
                    candidate.password_hash.clone(),
                    salt,
                )
                .await?
            {
                matched = Some(candidate);
                break;
            }
        }

        let user = matched.ok_or(AuthError::BadCredentials)?;
        if !user.enabled {
            return Err(AuthError::BadCredentials);
        }

        let roles = RoleGrant::roles_for_user(&mut conn, user.id).await?;

        let now = Utc::now();
        let signing_key = self
            .keystore
            .primary_signing_key_at(now)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let now_ts = now.timestamp() as u64;
        let access_token = self
            .tokens
            .mint_access(user.id, user.tenant_id, &roles, &signing_key, now_ts)
            .map_err(AuthError::from)?;

        let refresh_token = TokenService::mint_refresh();
        let refresh_hash = self.password.token_lookup_key(&refresh_token);
        RefreshToken::store(
            &mut conn,
            user.id,
            &refresh_hash,
            now + Duration::seconds(self.refresh_ttl as i64),
        )
        .await?;

        info!(user_id = %user.id, "Login issued token pair");
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_in: self.tokens.access_ttl(),
            user_id: user.id,
            tenant_id: user.tenant_id,
            roles,
        })
    }

    /// Exchange a live refresh token for a fresh access token. The refresh
    /// token itself is not rotated.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        access_token: Option<&str>,
    ) -> Result<(String, u64), AuthError> {
        let mut conn = self.conn().await?;

        let refresh_hash = self.password.token_lookup_key(refresh_token);
        let stored = RefreshToken::find_by_hash(&mut conn, &refresh_hash).await?;

        let now = Utc::now();
        stored.check_usable(now)?;

        let user = User::find_by_id(&mut conn, stored.user_id, false)
            .await
            .map_err(|_| AuthError::BadCredentials)?;
        if !user.enabled {
            return Err(AuthError::BadCredentials);
        }

        // A parseable access token must belong to the same subject. A
        // malformed or expired one is the expected reason to be here and
        // is ignored.
        if let Some(access) = access_token {
            if let Ok(claims) = TokenService::parse_unverified(access) {
                if claims.sub != stored.user_id.to_string() {
                    return Err(AuthError::BadCredentials);
                }
            }
        }

        let roles = RoleGrant::roles_for_user(&mut conn, user.id).await?;
        let signing_key = self
            .keystore
            .primary_signing_key_at(now)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let access = self
            .tokens
            .mint_access(
                user.id,
                user.tenant_id,
                &roles,
                &signing_key,
                now.timestamp() as u64,
            )
            .map_err(AuthError::from)?;

        Ok((access, self.tokens.access_ttl()))
    }

    /// Terminate one session: revoke the refresh token and blacklist the
    /// access token for its remaining lifetime. The blacklist write must be
    /// observable before this returns, which is why it fails closed.
    pub async fn logout(&self, refresh_token: &str, access_token: &str) -> Result<(), AuthError> {
        let claims = self
            .verify_access(access_token)
            .await
            .map_err(|_| AuthError::Unauthorized)?;
        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Unauthorized)?;

        let mut conn = self.conn().await?;
        let refresh_hash = self.password.token_lookup_key(refresh_token);
        let stored = RefreshToken::find_by_hash(&mut conn, &refresh_hash)
            .await
            .map_err(|_| AuthError::BadCredentials)?;

        if !self
            .password
            .token_matches_key(refresh_token, &stored.token_hash)
        {
            return Err(AuthError::BadCredentials);
        }
        if stored.user_id != user_id {
            return Err(AuthError::BadCredentials);
        }
        if stored.revoked {
            return Err(AuthError::BadCredentials);
        }

        RefreshToken::revoke(&mut conn, stored.id).await?;

        let now_ts = Utc::now().timestamp() as u64;
        self.revocation
            .revoke_token(&claims.jti, claims.remaining_ttl_at(now_ts))
            .await?;

        info!(user_id = %user_id, "Session logged out");
        Ok(())
    }

    /// Terminate every session of the calling user: revoke all refresh
    /// tokens, advance the revocation epoch so access tokens issued before
    /// now are rejected everywhere, and blacklist the calling token.
    pub async fn logout_all(&self, access_token: &str) -> Result<(), AuthError> {
        let claims = self
            .verify_access(access_token)
            .await
            .map_err(|_| AuthError::Unauthorized)?;
        let user_id =
            Uuid::parse_str(&claims.sub).map_err(|_| AuthError::Unauthorized)?;

        let mut conn = self.conn().await?;
        let revoked = RefreshToken::revoke_all_for_user(&mut conn, user_id).await?;

        let now_ts = Utc::now().timestamp() as u64;
        self.revocation.revoke_all_for_user(user_id, now_ts).await?;
        self.revocation
            .revoke_token(&claims.jti, claims.remaining_ttl_at(now_ts))
            .await?;

        info!(user_id = %user_id, revoked_refresh_tokens = revoked, "All sessions revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_strategy_policy() {
        let explicit = Uuid::new_v4();

        // an explicit tenant always wins, whatever the role
        for role in [Role::Customer, Role::Seller, Role::Admin, Role::Staff, Role::Driver] {
            assert_eq!(
                tenant_strategy(role, Some(explicit)),
                TenantStrategy::Explicit(explicit)
            );
        }

        assert_eq!(tenant_strategy(Role::Customer, None), TenantStrategy::Default);
        assert_eq!(
            tenant_strategy(Role::Seller, None),
            TenantStrategy::CreateForSeller
        );
        assert_eq!(tenant_strategy(Role::Admin, None), TenantStrategy::Reject);
        assert_eq!(tenant_strategy(Role::Staff, None), TenantStrategy::Reject);
        assert_eq!(tenant_strategy(Role::Driver, None), TenantStrategy::Reject);
    }

    #[test]
    fn test_identifier_validation() {
        assert!(AuthService::validate_identifiers(&None, &None).is_err());
        assert!(AuthService::validate_identifiers(
            &Some("a@b.com".to_string()),
            &None
        )
        .is_ok());
        assert!(AuthService::validate_identifiers(
            &None,
            &Some("+15551234567".to_string())
        )
        .is_ok());
        assert!(AuthService::validate_identifiers(
            &Some("not-an-email".to_string()),
            &None
        )
        .is_err());
        assert!(AuthService::validate_identifiers(
            &None,
            &Some("5551234567".to_string())
        )
        .is_err());
    }
}
