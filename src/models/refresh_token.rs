// Refresh token database model
// Only the deterministic hash of the opaque token string is persisted;
// the cleartext is returned to the client exactly once. Lookup is by hash.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::refresh_tokens;

/// Refresh token database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = refresh_tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New refresh token for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors for refresh token operations
#[derive(thiserror::Error, Debug)]
pub enum RefreshTokenError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Token not found")]
    NotFound,

    #[error("Token expired")]
    Expired,

    #[error("Token revoked")]
    Revoked,
}

impl RefreshToken {
    /// Persist a new token hash for a user
    pub async fn store(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        token_hash_val: &str,
        expires_at_val: DateTime<Utc>,
    ) -> Result<Self, RefreshTokenError> {
        use crate::schema::refresh_tokens::dsl::*;

        let now = Utc::now();
        let new_token = NewRefreshToken {
            user_id: user_id_val,
            token_hash: token_hash_val.to_string(),
            expires_at: expires_at_val,
            revoked: false,
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(refresh_tokens)
            .values(&new_token)
            .get_result::<RefreshToken>(conn)
            .await
            .map_err(RefreshTokenError::Database)
    }

    /// O(1) lookup by deterministic hash
    pub async fn find_by_hash(
        conn: &mut AsyncPgConnection,
        token_hash_val: &str,
    ) -> Result<Self, RefreshTokenError> {
        use crate::schema::refresh_tokens::dsl::*;

        refresh_tokens
            .filter(token_hash.eq(token_hash_val))
            .first::<RefreshToken>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => RefreshTokenError::NotFound,
                _ => RefreshTokenError::Database(e),
            })
    }

    /// Assert the token is usable at `now`
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<(), RefreshTokenError> {
        if self.revoked {
            return Err(RefreshTokenError::Revoked);
        }
        if self.expires_at <= now {
            return Err(RefreshTokenError::Expired);
        }
        Ok(())
    }

    /// Mark a single token revoked. The only mutation this table sees.
    pub async fn revoke(
        conn: &mut AsyncPgConnection,
        token_id: Uuid,
    ) -> Result<(), RefreshTokenError> {
        use crate::schema::refresh_tokens::dsl::*;

        diesel::update(refresh_tokens.filter(id.eq(token_id)))
            .set((revoked.eq(true), updated_at.eq(Utc::now())))
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Revoke every live token for a user; returns how many were revoked
    pub async fn revoke_all_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> Result<usize, RefreshTokenError> {
        use crate::schema::refresh_tokens::dsl::*;

        let count = diesel::update(
            refresh_tokens
                .filter(user_id.eq(user_id_val))
                .filter(revoked.eq(false)),
        )
        .set((revoked.eq(true), updated_at.eq(Utc::now())))
        .execute(conn)
        .await?;

        Ok(count)
    }

}
