use serde::{Deserialize, Serialize};

/// Personal customer assignment of an organization staff member.
///
/// Exists only for organization-side users. At most one assignment per
/// user is marked primary. The full set is replaced atomically when an
/// admin re-assigns a staff member's portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerAssignment {
    pub user_id: String,
    pub customer_id: String,
    pub is_primary: bool,
    /// Admin who performed the (re)assignment.
    pub assigned_by: String,
    /// RFC 3339 timestamp of the replace that produced this row.
    pub assigned_at: String,
}

/// Input for replacing a user's full assignment set.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceAssignments {
    pub customer_ids: Vec<String>,
    /// Must be a member of `customer_ids` when given.
    #[serde(default)]
    pub primary_customer_id: Option<String>,
}
