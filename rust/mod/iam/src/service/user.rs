use emitrace_core::{ListParams, ListResult, new_id, now_rfc3339};
use emitrace_sql::Value;
use tracing::warn;

use crate::model::{
    AccessScope, CreateUser, CustomRole, Pattern, ResolvedUser, SetUserOverride, User,
    UserPermissionOverride, validate_tenant_anchor,
};
use crate::service::{IamError, IamService};

impl IamService {
    /// Create a user. The tenant-anchor invariant is enforced here:
    /// customer-side roles carry `customer_id` and never
    /// `organization_id`, organization staff the reverse, SuperAdmin
    /// neither.
    pub fn create_user(&self, input: CreateUser) -> Result<User, IamError> {
        if input.name.is_empty() {
            return Err(IamError::Validation("user name cannot be empty".into()));
        }
        validate_tenant_anchor(
            input.system_role,
            input.organization_id.as_deref(),
            input.customer_id.as_deref(),
        )
        .map_err(IamError::Validation)?;

        if let Some(rid) = &input.custom_role_id {
            let _: CustomRole = self.get_record("custom_roles", rid).map_err(|_| {
                IamError::Validation(format!("custom role '{}' does not exist", rid))
            })?;
        }

        let now = now_rfc3339();
        let user = User {
            id: new_id(),
            name: input.name,
            email: input.email,
            system_role: input.system_role,
            organization_id: input.organization_id,
            customer_id: input.customer_id,
            access_scope: input.access_scope,
            custom_role_id: input.custom_role_id,
            created_at: now.clone(),
            updated_at: now,
        };

        self.insert_record("users", &user.id, &user, &user_indexes(&user))?;
        Ok(user)
    }

    /// Get a user record by id.
    pub fn get_user(&self, id: &str) -> Result<User, IamError> {
        self.get_record("users", id)
    }

    /// List users, optionally filtered by tenant.
    pub fn list_users(
        &self,
        organization_id: Option<&str>,
        customer_id: Option<&str>,
        params: &ListParams,
    ) -> Result<ListResult<User>, IamError> {
        let mut filters: Vec<(&str, Value)> = Vec::new();
        if let Some(org) = organization_id {
            filters.push(("organization_id", Value::Text(org.to_string())));
        }
        if let Some(customer) = customer_id {
            filters.push(("customer_id", Value::Text(customer.to_string())));
        }
        let (items, total) = self.list_records("users", &filters, params.limit, params.offset)?;
        Ok(ListResult { items, total })
    }

    /// Delete a user. Cascades to overrides and assignments.
    pub fn delete_user(&self, id: &str) -> Result<(), IamError> {
        self.delete_record("users", id)?;
        self.resolution_cache.invalidate(id);
        Ok(())
    }

    /// Toggle a user's access scope (ALL vs ASSIGNED). Admin action;
    /// the scope builder reads the stored value at query time.
    pub fn set_access_scope(&self, id: &str, scope: AccessScope) -> Result<User, IamError> {
        let mut user = self.get_user(id)?;
        if scope == AccessScope::Assigned && !user.system_role.is_organization_side() {
            return Err(IamError::Validation(
                "access scope applies to organization staff only".into(),
            ));
        }
        user.access_scope = scope;
        user.updated_at = now_rfc3339();
        self.update_record("users", id, &user, &user_indexes(&user))?;
        Ok(user)
    }

    /// Point a user at a custom role (or detach with `None`).
    pub fn set_custom_role(
        &self,
        id: &str,
        custom_role_id: Option<String>,
    ) -> Result<User, IamError> {
        if let Some(rid) = &custom_role_id {
            let role: CustomRole = self.get_record("custom_roles", rid).map_err(|_| {
                IamError::Validation(format!("custom role '{}' does not exist", rid))
            })?;
            let user = self.get_user(id)?;
            let tenant_matches = match user.system_role {
                r if r.is_organization_side() => role.organization_id == user.organization_id,
                r if r.is_customer_side() => role.customer_id == user.customer_id,
                _ => false,
            };
            if !tenant_matches {
                return Err(IamError::Validation(format!(
                    "custom role '{}' belongs to a different tenant",
                    rid,
                )));
            }
        }

        let mut user = self.get_user(id)?;
        user.custom_role_id = custom_role_id;
        user.updated_at = now_rfc3339();
        self.update_record("users", id, &user, &user_indexes(&user))?;
        self.resolution_cache.invalidate(id);
        Ok(user)
    }

    // ── User-level overrides ──

    /// Set (upsert) a user-level override. `granted_by` is the acting
    /// admin, kept for the audit trail.
    pub fn set_user_override(
        &self,
        user_id: &str,
        input: SetUserOverride,
        granted_by: &str,
    ) -> Result<UserPermissionOverride, IamError> {
        let _ = self.get_user(user_id)?;

        let pattern: Pattern = input
            .pattern
            .parse()
            .map_err(|e| IamError::Validation(format!("{}", e)))?;
        self.registry
            .validate_pattern(&pattern)
            .map_err(IamError::Validation)?;

        let ov = UserPermissionOverride {
            pattern,
            granted: input.granted,
            granted_by: granted_by.to_string(),
            reason: input.reason,
            created_at: now_rfc3339(),
        };

        self.sql
            .exec(
                "INSERT INTO user_overrides (user_id, pattern, granted, granted_by, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (user_id, pattern) DO UPDATE SET
                     granted = excluded.granted,
                     granted_by = excluded.granted_by,
                     reason = excluded.reason,
                     created_at = excluded.created_at",
                &[
                    Value::Text(user_id.to_string()),
                    Value::Text(ov.pattern.to_string()),
                    Value::Integer(ov.granted as i64),
                    Value::Text(ov.granted_by.clone()),
                    match &ov.reason {
                        Some(r) => Value::Text(r.clone()),
                        None => Value::Null,
                    },
                    Value::Text(ov.created_at.clone()),
                ],
            )
            .map_err(|e| IamError::Storage(e.to_string()))?;

        self.resolution_cache.invalidate(user_id);
        Ok(ov)
    }

    /// Remove a user-level override by pattern.
    pub fn remove_user_override(&self, user_id: &str, pattern: &str) -> Result<(), IamError> {
        let pattern: Pattern = pattern
            .parse()
            .map_err(|e| IamError::Validation(format!("{}", e)))?;
        let affected = self.sql
            .exec(
                "DELETE FROM user_overrides WHERE user_id = ?1 AND pattern = ?2",
                &[
                    Value::Text(user_id.to_string()),
                    Value::Text(pattern.to_string()),
                ],
            )
            .map_err(|e| IamError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(IamError::NotFound(format!(
                "override '{}' for user '{}'",
                pattern, user_id,
            )));
        }
        self.resolution_cache.invalidate(user_id);
        Ok(())
    }

    /// A user's overrides in application order (oldest first).
    pub fn list_user_overrides(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserPermissionOverride>, IamError> {
        let rows = self.sql
            .query(
                "SELECT pattern, granted, granted_by, reason, created_at
                 FROM user_overrides WHERE user_id = ?1 ORDER BY created_at, pattern",
                &[Value::Text(user_id.to_string())],
            )
            .map_err(|e| IamError::Storage(e.to_string()))?;

        let mut overrides = Vec::with_capacity(rows.len());
        for row in &rows {
            let pattern = row
                .get_str("pattern")
                .ok_or_else(|| IamError::Internal("missing pattern column".into()))?;
            overrides.push(UserPermissionOverride {
                pattern: pattern
                    .parse()
                    .map_err(|e| IamError::Internal(format!("stored pattern: {}", e)))?,
                granted: row.get_bool("granted").unwrap_or(false),
                granted_by: row.get_str("granted_by").unwrap_or_default().to_string(),
                reason: row.get_str("reason").map(|s| s.to_string()),
                created_at: row.get_str("created_at").unwrap_or_default().to_string(),
            });
        }
        Ok(overrides)
    }

    // ── Loader ──

    /// Load a fully resolved user: custom role (template + role
    /// overrides joined) and user-level overrides.
    ///
    /// A dangling `custom_role_id` degrades to "no custom role" — the
    /// user keeps their system-role baseline and user overrides.
    pub fn load_user(&self, id: &str) -> Result<ResolvedUser, IamError> {
        let user = self.get_user(id)?;

        let custom_role = match &user.custom_role_id {
            Some(rid) => match self.get_custom_role(rid) {
                Ok(role) => Some(role),
                Err(IamError::NotFound(_)) => {
                    warn!(user = id, role = rid.as_str(), "user references missing custom role");
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let overrides = self.list_user_overrides(id)?;

        Ok(ResolvedUser {
            id: user.id,
            name: user.name,
            system_role: user.system_role,
            organization_id: user.organization_id,
            customer_id: user.customer_id,
            access_scope: user.access_scope,
            custom_role,
            overrides,
        })
    }
}

fn user_indexes(user: &User) -> Vec<(&'static str, Value)> {
    vec![
        ("name", Value::Text(user.name.clone())),
        ("system_role", Value::Text(user.system_role.as_str().to_string())),
        (
            "organization_id",
            match &user.organization_id {
                Some(o) => Value::Text(o.clone()),
                None => Value::Null,
            },
        ),
        (
            "customer_id",
            match &user.customer_id {
                Some(c) => Value::Text(c.clone()),
                None => Value::Null,
            },
        ),
        (
            "access_scope",
            Value::Text(match user.access_scope {
                AccessScope::All => "ALL".to_string(),
                AccessScope::Assigned => "ASSIGNED".to_string(),
            }),
        ),
        (
            "custom_role_id",
            match &user.custom_role_id {
                Some(r) => Value::Text(r.clone()),
                None => Value::Null,
            },
        ),
        ("created_at", Value::Text(user.created_at.clone())),
        ("updated_at", Value::Text(user.updated_at.clone())),
    ]
}
