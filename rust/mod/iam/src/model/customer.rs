use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A customer tenant (plant operator) as registered with the platform.
///
/// Visibility for organization staff derives from `organization_id`
/// (the organization whose user created the record) and from approved
/// [`CustomerOrganization`] links — never from permission grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Unique identifier (UUIDv4, no dashes).
    pub id: String,

    pub name: String,

    /// User who created the record.
    pub created_by: String,

    /// Organization of the creating user.
    pub organization_id: String,

    /// Whether the customer profile is discoverable by other
    /// organizations when requesting a link. Does not affect tenant
    /// scope.
    #[serde(default)]
    pub is_public: bool,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// RFC 3339 last update timestamp.
    pub updated_at: String,
}

/// Input for registering a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomer {
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
}

/// Status of a customer-organization link request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Pending,
    Approved,
    Rejected,
}

/// Link between a customer and an organization that did not create it.
/// Only `Approved` links widen the organization's tenant scope.
///
/// ID is derived from hash(customer_id + organization_id) — the same
/// pair always maps to the same link, so re-requesting upserts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerOrganization {
    /// Deterministic id: hex(sha256(customer_id + ":" + organization_id)),
    /// first 32 chars.
    pub id: String,

    pub customer_id: String,
    pub organization_id: String,
    pub status: LinkStatus,

    /// User who filed the request.
    pub requested_by: String,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// RFC 3339 last update timestamp.
    pub updated_at: String,
}

/// Input for requesting a link.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLink {
    pub customer_id: String,
    pub organization_id: String,
}

/// Input for deciding a pending link.
#[derive(Debug, Clone, Deserialize)]
pub struct DecideLink {
    pub status: LinkStatus,
}

/// Compute the deterministic link id from (customer_id, organization_id).
pub fn link_id(customer_id: &str, organization_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(customer_id.as_bytes());
    hasher.update(b":");
    hasher.update(organization_id.as_bytes());
    let digest = hasher.finalize();
    // First 16 bytes (32 hex chars) — short but collision-safe here.
    let mut s = String::with_capacity(32);
    for b in &digest[..16] {
        s.push_str(&format!("{:02x}", b));
    }
    s
}
