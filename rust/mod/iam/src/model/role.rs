use serde::{Deserialize, Serialize};

use crate::model::pattern::Pattern;

/// Which side of the tenancy divide a role template serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleCategory {
    Organization,
    Customer,
}

impl RoleCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleCategory::Organization => "ORGANIZATION",
            RoleCategory::Customer => "CUSTOMER",
        }
    }
}

/// An immutable catalogue entry seeded at deployment. Tenants reference
/// templates from their custom roles but never create or edit them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleTemplate {
    /// Stable identifier, e.g. "org_measurement_lead".
    pub id: String,

    /// Human-readable name.
    pub name: String,

    pub category: RoleCategory,

    /// Patterns granted by default when a custom role uses this template.
    pub default_permissions: Vec<Pattern>,

    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// A single entry of a custom role's override list.
///
/// `granted = true` inserts the pattern into the running set,
/// `granted = false` removes that exact pattern. List order matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleOverride {
    pub pattern: Pattern,
    pub granted: bool,
}

/// A tenant-owned role: an optional template plus an ordered override
/// list. Owned by exactly one organization or one customer; a referenced
/// template must be of the matching category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomRole {
    /// Unique identifier (UUIDv4, no dashes).
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Owning organization. Mutually exclusive with `customer_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    /// Owning customer. Mutually exclusive with `organization_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,

    /// Joined template. Loaded from the catalogue, never persisted here.
    #[serde(skip)]
    pub template: Option<RoleTemplate>,

    /// Ordered override list. Stored as child rows, joined on load.
    #[serde(skip)]
    pub overrides: Vec<RoleOverride>,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// RFC 3339 last update timestamp.
    pub updated_at: String,
}

/// Input for creating a custom role.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomRole {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    /// Initial override list, in application order. Patterns as strings;
    /// validated against the registry at write time.
    #[serde(default)]
    pub overrides: Vec<OverrideInput>,
}

/// One override entry as submitted by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct OverrideInput {
    pub pattern: String,
    pub granted: bool,
}
