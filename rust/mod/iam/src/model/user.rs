use serde::{Deserialize, Serialize};

use crate::model::pattern::Pattern;
use crate::model::role::CustomRole;

/// Built-in system roles.
///
/// Organization-side roles belong to a measurement organization and
/// carry `organization_id`; customer-side roles belong to a plant
/// operator and carry `customer_id`. `SuperAdmin` carries neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemRole {
    SuperAdmin,
    OrgAdmin,
    Operator,
    CustomerAdmin,
    CustomerUser,
    CustomerSiteAdmin,
    CustomerSiteUser,
    CustomerGroupAdmin,
    CustomerGroupUser,
}

impl SystemRole {
    pub fn as_str(self) -> &'static str {
        match self {
            SystemRole::SuperAdmin => "SUPER_ADMIN",
            SystemRole::OrgAdmin => "ORG_ADMIN",
            SystemRole::Operator => "OPERATOR",
            SystemRole::CustomerAdmin => "CUSTOMER_ADMIN",
            SystemRole::CustomerUser => "CUSTOMER_USER",
            SystemRole::CustomerSiteAdmin => "CUSTOMER_SITE_ADMIN",
            SystemRole::CustomerSiteUser => "CUSTOMER_SITE_USER",
            SystemRole::CustomerGroupAdmin => "CUSTOMER_GROUP_ADMIN",
            SystemRole::CustomerGroupUser => "CUSTOMER_GROUP_USER",
        }
    }

    /// Organization staff: belongs to a measurement organization.
    pub fn is_organization_side(self) -> bool {
        matches!(self, SystemRole::OrgAdmin | SystemRole::Operator)
    }

    /// Customer-side: belongs to exactly one customer tenant.
    pub fn is_customer_side(self) -> bool {
        matches!(
            self,
            SystemRole::CustomerAdmin
                | SystemRole::CustomerUser
                | SystemRole::CustomerSiteAdmin
                | SystemRole::CustomerSiteUser
                | SystemRole::CustomerGroupAdmin
                | SystemRole::CustomerGroupUser
        )
    }
}

/// Per-user toggle narrowing an organization staff member's tenant scope
/// to their personally assigned customers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessScope {
    #[default]
    All,
    Assigned,
}

/// A user account record as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (UUIDv4, no dashes).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    pub system_role: SystemRole,

    /// Tenant anchor for organization staff. Mutually exclusive with
    /// `customer_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    /// Tenant anchor for customer-side users. Mutually exclusive with
    /// `organization_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,

    #[serde(default)]
    pub access_scope: AccessScope,

    /// Optional custom role. Resolved lazily; a dangling reference
    /// degrades to "no custom role".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_role_id: Option<String>,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// RFC 3339 last update timestamp.
    pub updated_at: String,
}

/// Input for creating a new user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub system_role: SystemRole,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub access_scope: AccessScope,
    #[serde(default)]
    pub custom_role_id: Option<String>,
}

/// An audited, user-level permission exception. Highest-priority layer
/// of the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPermissionOverride {
    pub pattern: Pattern,
    pub granted: bool,
    /// User id of the admin who granted/revoked.
    pub granted_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// RFC 3339 timestamp; overrides apply in this order.
    pub created_at: String,
}

/// Input for setting a user-level override.
#[derive(Debug, Clone, Deserialize)]
pub struct SetUserOverride {
    pub pattern: String,
    pub granted: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A fully loaded user, ready for permission resolution and scope
/// building. Produced by the user loader; route handlers never assemble
/// this by hand.
#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub id: String,
    pub name: String,
    pub system_role: SystemRole,
    pub organization_id: Option<String>,
    pub customer_id: Option<String>,
    pub access_scope: AccessScope,
    /// Custom role with its template and role-level overrides joined.
    pub custom_role: Option<CustomRole>,
    /// User-level overrides, in application order.
    pub overrides: Vec<UserPermissionOverride>,
}

/// Validate the tenant-anchor invariant for a role/anchor combination:
/// customer-side roles carry `customer_id` and never `organization_id`,
/// organization staff the reverse, SuperAdmin neither.
pub fn validate_tenant_anchor(
    role: SystemRole,
    organization_id: Option<&str>,
    customer_id: Option<&str>,
) -> Result<(), String> {
    match role {
        SystemRole::SuperAdmin => {
            if organization_id.is_some() || customer_id.is_some() {
                return Err("SUPER_ADMIN must not have a tenant anchor".into());
            }
        }
        r if r.is_organization_side() => {
            if organization_id.is_none() {
                return Err("organization staff must have organization_id".into());
            }
            if customer_id.is_some() {
                return Err("organization staff must not have customer_id".into());
            }
        }
        _ => {
            if customer_id.is_none() {
                return Err("customer-side users must have customer_id".into());
            }
            if organization_id.is_some() {
                return Err("customer-side users must not have organization_id".into());
            }
        }
    }
    Ok(())
}
