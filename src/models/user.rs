// User account database model
// Tenant-scoped identity records; uniqueness of email/phone is enforced
// per tenant by partial unique indexes.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::users;

/// User account database model - queryable from database
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: String,
    pub salt: String,
    pub tenant_id: Uuid,
    pub enabled: bool,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New user account for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub password_hash: String,
    pub salt: String,
    pub tenant_id: Uuid,
    pub enabled: bool,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors for user account operations
#[derive(thiserror::Error, Debug)]
pub enum UserError {
    #[error("Database error: {0}")]
    Database(diesel::result::Error),

    #[error("User not found")]
    NotFound,

    #[error("Email already registered in tenant")]
    EmailTaken,

    #[error("Phone already registered in tenant")]
    PhoneTaken,
}

impl From<diesel::result::Error> for UserError {
    fn from(err: diesel::result::Error) -> Self {
        match &err {
            diesel::result::Error::NotFound => UserError::NotFound,
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                match info.constraint_name() {
                    Some(name) if name.contains("email") => UserError::EmailTaken,
                    Some(name) if name.contains("phone") => UserError::PhoneTaken,
                    _ => UserError::Database(err),
                }
            },
            _ => UserError::Database(err),
        }
    }
}

impl User {
    /// Find user by id. Soft-deleted accounts are excluded unless
    /// `include_deleted` is set.
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        user_id: Uuid,
        include_deleted: bool,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        let mut query = users.filter(id.eq(user_id)).into_boxed();
        if !include_deleted {
            query = query.filter(deleted.eq(false));
        }

        query
            .first::<User>(conn)
            .await
            .map_err(UserError::from)
    }

    /// Find all accounts registered with an email address, across tenants.
    /// The composite unique key is (email, tenant_id), so the same address
    /// can legitimately resolve to one account per tenant.
    pub async fn find_by_email(
        conn: &mut AsyncPgConnection,
        email_val: &str,
    ) -> Result<Vec<Self>, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(email.eq(email_val))
            .filter(deleted.eq(false))
            .order(created_at.asc())
            .load::<User>(conn)
            .await
            .map_err(UserError::from)
    }

    /// Find all accounts registered with a phone number, across tenants.
    pub async fn find_by_phone(
        conn: &mut AsyncPgConnection,
        phone_val: &str,
    ) -> Result<Vec<Self>, UserError> {
        use crate::schema::users::dsl::*;

        users
            .filter(phone.eq(phone_val))
            .filter(deleted.eq(false))
            .order(created_at.asc())
            .load::<User>(conn)
            .await
            .map_err(UserError::from)
    }

    /// Create a new user account. Tenant-scoped uniqueness violations
    /// surface as `EmailTaken` / `PhoneTaken` via the constraint name.
    pub async fn create(
        conn: &mut AsyncPgConnection,
        new_user: NewUser,
    ) -> Result<Self, UserError> {
        use crate::schema::users::dsl::*;

        diesel::insert_into(users)
            .values(&new_user)
            .get_result::<User>(conn)
            .await
            .map_err(UserError::from)
    }

    /// The identifier shown back to the registrant: email wins over phone.
    pub fn identifier(&self) -> &str {
        self.email
            .as_deref()
            .or(self.phone.as_deref())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(email: Option<&str>, phone: Option<&str>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: email.map(String::from),
            phone: phone.map(String::from),
            password_hash: "$argon2id$stub".to_string(),
            salt: "c2FsdA".to_string(),
            tenant_id: Uuid::nil(),
            enabled: true,
            email_verified: false,
            phone_verified: false,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_identifier_prefers_email() {
        let user = sample_user(Some("a@b.com"), Some("+15551230000"));
        assert_eq!(user.identifier(), "a@b.com");

        let phone_only = sample_user(None, Some("+15551230000"));
        assert_eq!(phone_only.identifier(), "+15551230000");
    }
}
