// Tenant database model
// Administrative isolation boundary for the marketplace

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::tenants;

/// Fixed well-known id of the default marketplace tenant. Customer
/// self-registration without an explicit tenant lands here.
pub const DEFAULT_TENANT_ID: Uuid = Uuid::nil();

/// Tenant status - tenants are never deleted, only transitioned
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TenantStatus {
    Active,
    Inactive,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TenantStatus::Active),
            "inactive" => Ok(TenantStatus::Inactive),
            _ => Err(format!("Invalid tenant status: {}", s)),
        }
    }
}

/// Tenant database model - queryable from database
#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = tenants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New tenant for insertion
#[derive(Debug, Insertable)]
#[diesel(table_name = tenants)]
pub struct NewTenant {
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Errors for tenant operations
#[derive(thiserror::Error, Debug)]
pub enum TenantError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Tenant not found")]
    NotFound,
}

impl Tenant {
    /// Find tenant by id
    pub async fn find_by_id(
        conn: &mut AsyncPgConnection,
        tenant_id: Uuid,
    ) -> Result<Self, TenantError> {
        use crate::schema::tenants::dsl::*;

        tenants
            .filter(id.eq(tenant_id))
            .first::<Tenant>(conn)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => TenantError::NotFound,
                _ => TenantError::Database(e),
            })
    }

    /// Create a new tenant
    pub async fn create(
        conn: &mut AsyncPgConnection,
        tenant_name: &str,
    ) -> Result<Self, TenantError> {
        use crate::schema::tenants::dsl::*;

        let now = Utc::now();
        let new_tenant = NewTenant {
            name: tenant_name.to_string(),
            status: TenantStatus::Active.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };

        diesel::insert_into(tenants)
            .values(&new_tenant)
            .get_result::<Tenant>(conn)
            .await
            .map_err(TenantError::Database)
    }

    /// Ensure the well-known default marketplace tenant exists. Idempotent,
    /// invoked during startup bootstrap.
    pub async fn ensure_default(conn: &mut AsyncPgConnection) -> Result<Self, TenantError> {
        use crate::schema::tenants::dsl::*;

        let now = Utc::now();
        diesel::insert_into(tenants)
            .values((
                id.eq(DEFAULT_TENANT_ID),
                name.eq("marketplace"),
                status.eq(TenantStatus::Active.as_str()),
                created_at.eq(now),
                updated_at.eq(now),
            ))
            .on_conflict(id)
            .do_nothing()
            .execute(conn)
            .await?;

        Self::find_by_id(conn, DEFAULT_TENANT_ID).await
    }

    /// Get tenant status as enum
    pub fn status_enum(&self) -> TenantStatus {
        TenantStatus::from_str(&self.status).unwrap_or_else(|e| {
            tracing::warn!(
                "Invalid status '{}' for tenant {}, treating as inactive: {}",
                self.status,
                self.id,
                e
            );
            TenantStatus::Inactive
        })
    }

    pub fn is_active(&self) -> bool {
        self.status_enum() == TenantStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_status_conversion() {
        assert_eq!(TenantStatus::Active.as_str(), "active");
        assert_eq!(TenantStatus::Inactive.as_str(), "inactive");

        assert_eq!(
            TenantStatus::from_str("active"),
            Ok(TenantStatus::Active)
        );
        assert_eq!(
            TenantStatus::from_str("inactive"),
            Ok(TenantStatus::Inactive)
        );
        assert!(TenantStatus::from_str("deleted").is_err());
    }

    #[test]
    fn test_default_tenant_id_is_well_known() {
        assert_eq!(
            DEFAULT_TENANT_ID.to_string(),
            "00000000-0000-0000-0000-000000000000"
        );
    }
}
