// Role grant database model
// A user holds one or more marketplace roles; (user_id, role) is unique

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::role_grants;

/// Marketplace roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Customer,
    Seller,
    Admin,
    Staff,
    Driver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Seller => "SELLER",
            Role::Admin => "ADMIN",
            Role::Staff => "STAFF",
            Role::Driver => "DRIVER",
        }
    }

    /// Roles that may operate on any resource within their own tenant
    pub fn is_tenant_operator(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CUSTOMER" => Ok(Role::Customer),
            "SELLER" => Ok(Role::Seller),
            "ADMIN" => Ok(Role::Admin),
            "STAFF" => Ok(Role::Staff),
            "DRIVER" => Ok(Role::Driver),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role grant database model
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = role_grants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RoleGrant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// New role grant for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = role_grants)]
pub struct NewRoleGrant {
    pub user_id: Uuid,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Errors for role grant operations
#[derive(thiserror::Error, Debug)]
pub enum RoleGrantError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl RoleGrant {
    /// Grant a role to a user. Granting an already-held role is a no-op.
    pub async fn grant(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
        role_val: Role,
    ) -> Result<(), RoleGrantError> {
        use crate::schema::role_grants::dsl::*;

        diesel::insert_into(role_grants)
            .values(&NewRoleGrant {
                user_id: user_id_val,
                role: role_val.as_str().to_string(),
                created_at: Utc::now(),
            })
            .on_conflict((user_id, role))
            .do_nothing()
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Load all roles granted to a user
    pub async fn roles_for_user(
        conn: &mut AsyncPgConnection,
        user_id_val: Uuid,
    ) -> Result<Vec<Role>, RoleGrantError> {
        use crate::schema::role_grants::dsl::*;

        let grants = role_grants
            .filter(user_id.eq(user_id_val))
            .order(created_at.asc())
            .load::<RoleGrant>(conn)
            .await?;

        Ok(grants
            .iter()
            .filter_map(|g| match Role::from_str(&g.role) {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::warn!("Skipping unknown role grant for user {}: {}", user_id_val, e);
                    None
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_conversion() {
        assert_eq!(Role::Customer.as_str(), "CUSTOMER");
        assert_eq!(Role::Seller.as_str(), "SELLER");
        assert_eq!(Role::Admin.as_str(), "ADMIN");
        assert_eq!(Role::Staff.as_str(), "STAFF");
        assert_eq!(Role::Driver.as_str(), "DRIVER");

        assert_eq!(Role::from_str("CUSTOMER"), Ok(Role::Customer));
        assert_eq!(Role::from_str("DRIVER"), Ok(Role::Driver));
        assert!(Role::from_str("customer").is_err());
        assert!(Role::from_str("ROOT").is_err());
    }

    #[test]
    fn test_tenant_operator_roles() {
        assert!(Role::Admin.is_tenant_operator());
        assert!(Role::Staff.is_tenant_operator());
        assert!(!Role::Customer.is_tenant_operator());
        assert!(!Role::Seller.is_tenant_operator());
        assert!(!Role::Driver.is_tenant_operator());
    }
}
