use emitrace_core::{ListParams, ListResult, merge_patch, new_id, now_rfc3339};
use emitrace_sql::{Statement, Value};
use tracing::warn;

use crate::model::{
    CreateCustomRole, CustomRole, OverrideInput, Pattern, RoleCategory, RoleOverride,
    RoleTemplate,
};
use crate::service::{IamError, IamService};

impl IamService {
    /// Create a custom role, with its initial override list, in one
    /// transaction.
    pub fn create_custom_role(&self, input: CreateCustomRole) -> Result<CustomRole, IamError> {
        if input.name.is_empty() {
            return Err(IamError::Validation("role name cannot be empty".into()));
        }

        let category = owner_category(
            input.organization_id.as_deref(),
            input.customer_id.as_deref(),
        )?;

        let template = match &input.template_id {
            Some(tid) => {
                let template: RoleTemplate = self.get_record("role_templates", tid).map_err(
                    |_| IamError::Validation(format!("role template '{}' does not exist", tid)),
                )?;
                if template.category != category {
                    return Err(IamError::Validation(format!(
                        "template '{}' is {} but the role owner is {}",
                        tid,
                        template.category.as_str(),
                        category.as_str(),
                    )));
                }
                Some(template)
            }
            None => None,
        };

        let overrides = self.parse_overrides(&input.overrides)?;

        let now = now_rfc3339();
        let role = CustomRole {
            id: new_id(),
            name: input.name,
            description: input.description,
            organization_id: input.organization_id,
            customer_id: input.customer_id,
            template_id: input.template_id,
            template,
            overrides,
            created_at: now.clone(),
            updated_at: now.clone(),
        };

        let json = serde_json::to_string(&role)
            .map_err(|e| IamError::Internal(e.to_string()))?;

        let mut batch = vec![Statement::new(
            "INSERT INTO custom_roles
                (id, organization_id, customer_id, template_id, data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            vec![
                Value::Text(role.id.clone()),
                opt_text(&role.organization_id),
                opt_text(&role.customer_id),
                opt_text(&role.template_id),
                Value::Text(json),
                Value::Text(now.clone()),
                Value::Text(now),
            ],
        )];
        batch.extend(override_inserts(&role.id, &role.overrides));

        self.sql
            .exec_batch(&batch)
            .map_err(|e| IamError::Storage(e.to_string()))?;

        Ok(role)
    }

    /// Get a custom role with template and override list joined.
    pub fn get_custom_role(&self, id: &str) -> Result<CustomRole, IamError> {
        let mut role: CustomRole = self.get_record("custom_roles", id)?;
        role.overrides = self.load_role_overrides(id)?;
        role.template = match &role.template_id {
            Some(tid) => match self.get_record::<RoleTemplate>("role_templates", tid) {
                Ok(t) => Some(t),
                Err(_) => {
                    // Dangling template reference: treat as no template.
                    warn!(role = id, template = tid.as_str(), "custom role references missing template");
                    None
                }
            },
            None => None,
        };
        Ok(role)
    }

    /// List custom roles, optionally filtered by owning tenant.
    pub fn list_custom_roles(
        &self,
        organization_id: Option<&str>,
        customer_id: Option<&str>,
        params: &ListParams,
    ) -> Result<ListResult<CustomRole>, IamError> {
        let mut filters: Vec<(&str, Value)> = Vec::new();
        if let Some(org) = organization_id {
            filters.push(("organization_id", Value::Text(org.to_string())));
        }
        if let Some(customer) = customer_id {
            filters.push(("customer_id", Value::Text(customer.to_string())));
        }
        let (items, total) =
            self.list_records("custom_roles", &filters, params.limit, params.offset)?;
        Ok(ListResult { items, total })
    }

    /// Update a custom role's metadata with JSON merge-patch. The
    /// override list is not editable this way — see
    /// [`IamService::replace_role_overrides`].
    pub fn update_custom_role(
        &self,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<CustomRole, IamError> {
        let current = self.get_custom_role(id)?;
        let now = now_rfc3339();

        let mut base = serde_json::to_value(&current)
            .map_err(|e| IamError::Internal(e.to_string()))?;
        merge_patch(&mut base, &patch);
        // Identity and ownership are immutable.
        base["id"] = serde_json::json!(current.id);
        base["organization_id"] = serde_json::json!(current.organization_id);
        base["customer_id"] = serde_json::json!(current.customer_id);
        base["created_at"] = serde_json::json!(current.created_at);
        base["updated_at"] = serde_json::json!(now);

        let mut updated: CustomRole = serde_json::from_value(base)
            .map_err(|e| IamError::Validation(e.to_string()))?;

        if updated.template_id != current.template_id {
            if let Some(tid) = &updated.template_id {
                let category = owner_category(
                    updated.organization_id.as_deref(),
                    updated.customer_id.as_deref(),
                )?;
                let template: RoleTemplate = self.get_record("role_templates", tid).map_err(
                    |_| IamError::Validation(format!("role template '{}' does not exist", tid)),
                )?;
                if template.category != category {
                    return Err(IamError::Validation(format!(
                        "template '{}' is {} but the role owner is {}",
                        tid,
                        template.category.as_str(),
                        category.as_str(),
                    )));
                }
            }
        }

        self.update_record(
            "custom_roles",
            id,
            &updated,
            &[
                ("template_id", opt_text(&updated.template_id)),
                ("updated_at", Value::Text(now)),
            ],
        )?;

        // A template change alters layer 2 for every holder of the role.
        self.resolution_cache.invalidate_all();

        updated.overrides = current.overrides;
        updated.template = match &updated.template_id {
            Some(tid) => self.get_record::<RoleTemplate>("role_templates", tid).ok(),
            None => None,
        };
        Ok(updated)
    }

    /// Replace the role's full override list in one transaction. A
    /// concurrent reader observes either the old or the new list, never
    /// a partially replaced one.
    pub fn replace_role_overrides(
        &self,
        role_id: &str,
        inputs: &[OverrideInput],
    ) -> Result<CustomRole, IamError> {
        // Existence check first, for a clean 404.
        let _: CustomRole = self.get_record("custom_roles", role_id)?;

        let overrides = self.parse_overrides(inputs)?;
        let now = now_rfc3339();

        let mut batch = vec![Statement::new(
            "DELETE FROM role_overrides WHERE role_id = ?1",
            vec![Value::Text(role_id.to_string())],
        )];
        batch.extend(override_inserts(role_id, &overrides));
        batch.push(Statement::new(
            "UPDATE custom_roles SET updated_at = ?1 WHERE id = ?2",
            vec![Value::Text(now), Value::Text(role_id.to_string())],
        ));

        self.sql
            .exec_batch(&batch)
            .map_err(|e| IamError::Storage(e.to_string()))?;

        self.resolution_cache.invalidate_all();

        self.get_custom_role(role_id)
    }

    /// Delete a custom role. Refused while any user still references it.
    pub fn delete_custom_role(&self, id: &str) -> Result<(), IamError> {
        let rows = self.sql
            .query(
                "SELECT COUNT(*) as cnt FROM users WHERE custom_role_id = ?1",
                &[Value::Text(id.to_string())],
            )
            .map_err(|e| IamError::Storage(e.to_string()))?;
        let referencing = rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0);
        if referencing > 0 {
            return Err(IamError::Conflict(format!(
                "custom role '{}' is still referenced by {} user(s)",
                id, referencing,
            )));
        }

        // ON DELETE CASCADE removes the override rows.
        self.delete_record("custom_roles", id)?;
        self.resolution_cache.invalidate_all();
        Ok(())
    }

    /// Load a role's override list in application order.
    pub(crate) fn load_role_overrides(
        &self,
        role_id: &str,
    ) -> Result<Vec<RoleOverride>, IamError> {
        let rows = self.sql
            .query(
                "SELECT pattern, granted FROM role_overrides
                 WHERE role_id = ?1 ORDER BY position",
                &[Value::Text(role_id.to_string())],
            )
            .map_err(|e| IamError::Storage(e.to_string()))?;

        let mut overrides = Vec::with_capacity(rows.len());
        for row in &rows {
            let pattern = row
                .get_str("pattern")
                .ok_or_else(|| IamError::Internal("missing pattern column".into()))?;
            let pattern: Pattern = pattern
                .parse()
                .map_err(|e| IamError::Internal(format!("stored pattern: {}", e)))?;
            overrides.push(RoleOverride {
                pattern,
                granted: row.get_bool("granted").unwrap_or(false),
            });
        }
        Ok(overrides)
    }

    /// Parse and registry-validate submitted override entries.
    fn parse_overrides(&self, inputs: &[OverrideInput]) -> Result<Vec<RoleOverride>, IamError> {
        let mut overrides = Vec::with_capacity(inputs.len());
        for input in inputs {
            let pattern: Pattern = input
                .pattern
                .parse()
                .map_err(|e| IamError::Validation(format!("{}", e)))?;
            self.registry
                .validate_pattern(&pattern)
                .map_err(IamError::Validation)?;
            overrides.push(RoleOverride {
                pattern,
                granted: input.granted,
            });
        }
        Ok(overrides)
    }
}

/// Owning tenant side of a custom role — exactly one anchor.
fn owner_category(
    organization_id: Option<&str>,
    customer_id: Option<&str>,
) -> Result<RoleCategory, IamError> {
    match (organization_id, customer_id) {
        (Some(_), None) => Ok(RoleCategory::Organization),
        (None, Some(_)) => Ok(RoleCategory::Customer),
        _ => Err(IamError::Validation(
            "custom role needs exactly one of organization_id / customer_id".into(),
        )),
    }
}

fn override_inserts(role_id: &str, overrides: &[RoleOverride]) -> Vec<Statement> {
    overrides
        .iter()
        .enumerate()
        .map(|(i, ov)| {
            Statement::new(
                "INSERT INTO role_overrides (role_id, position, pattern, granted)
                 VALUES (?1, ?2, ?3, ?4)",
                vec![
                    Value::Text(role_id.to_string()),
                    Value::Integer(i as i64),
                    Value::Text(ov.pattern.to_string()),
                    Value::Integer(ov.granted as i64),
                ],
            )
        })
        .collect()
}

fn opt_text(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use crate::service::test_util::test_service;

    use crate::model::{CreateCustomRole, CreateUser, OverrideInput, SystemRole};

    fn ov(pattern: &str, granted: bool) -> OverrideInput {
        OverrideInput {
            pattern: pattern.to_string(),
            granted,
        }
    }

    #[test]
    fn test_custom_role_crud() {
        let svc = test_service();

        let role = svc
            .create_custom_role(CreateCustomRole {
                name: "Field technician".into(),
                description: None,
                organization_id: Some("O1".into()),
                customer_id: None,
                template_id: Some("org_measurement_lead".into()),
                overrides: vec![ov("report.create", false)],
            })
            .unwrap();

        let fetched = svc.get_custom_role(&role.id).unwrap();
        assert_eq!(fetched.name, "Field technician");
        assert!(fetched.template.is_some());
        assert_eq!(fetched.overrides.len(), 1);

        let updated = svc
            .update_custom_role(&role.id, serde_json::json!({"description": "on site"}))
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("on site"));

        let list = svc
            .list_custom_roles(Some("O1"), None, &Default::default())
            .unwrap();
        assert_eq!(list.total, 1);

        svc.delete_custom_role(&role.id).unwrap();
        assert!(svc.get_custom_role(&role.id).is_err());
    }

    #[test]
    fn test_category_mismatch_rejected() {
        let svc = test_service();
        let result = svc.create_custom_role(CreateCustomRole {
            name: "Wrong side".into(),
            description: None,
            organization_id: Some("O1".into()),
            customer_id: None,
            template_id: Some("customer_viewer".into()),
            overrides: vec![],
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_both_anchors_rejected() {
        let svc = test_service();
        let result = svc.create_custom_role(CreateCustomRole {
            name: "Two homes".into(),
            description: None,
            organization_id: Some("O1".into()),
            customer_id: Some("C1".into()),
            template_id: None,
            overrides: vec![],
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_pattern_rejected_at_write() {
        let svc = test_service();
        let result = svc.create_custom_role(CreateCustomRole {
            name: "Typo".into(),
            description: None,
            organization_id: Some("O1".into()),
            customer_id: None,
            template_id: None,
            overrides: vec![ov("invoice.aprove", true)],
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_replace_overrides_wholesale() {
        let svc = test_service();
        let role = svc
            .create_custom_role(CreateCustomRole {
                name: "Replace me".into(),
                description: None,
                organization_id: Some("O1".into()),
                customer_id: None,
                template_id: None,
                overrides: vec![ov("report.view", true), ov("report.create", true)],
            })
            .unwrap();

        let replaced = svc
            .replace_role_overrides(&role.id, &[ov("measurement.export", true)])
            .unwrap();
        assert_eq!(replaced.overrides.len(), 1);
        assert_eq!(replaced.overrides[0].pattern.to_string(), "measurement.export");
    }

    #[test]
    fn test_replace_with_invalid_pattern_keeps_old_list() {
        let svc = test_service();
        let role = svc
            .create_custom_role(CreateCustomRole {
                name: "Keep on failure".into(),
                description: None,
                organization_id: Some("O1".into()),
                customer_id: None,
                template_id: None,
                overrides: vec![ov("report.view", true)],
            })
            .unwrap();

        let result =
            svc.replace_role_overrides(&role.id, &[ov("report.view", true), ov("bogus", true)]);
        assert!(result.is_err());

        let fetched = svc.get_custom_role(&role.id).unwrap();
        assert_eq!(fetched.overrides.len(), 1);
    }

    #[test]
    fn test_delete_blocked_while_referenced() {
        let svc = test_service();
        let role = svc
            .create_custom_role(CreateCustomRole {
                name: "In use".into(),
                description: None,
                organization_id: Some("O1".into()),
                customer_id: None,
                template_id: None,
                overrides: vec![],
            })
            .unwrap();

        let user = svc
            .create_user(CreateUser {
                name: "Holder".into(),
                email: None,
                system_role: SystemRole::Operator,
                organization_id: Some("O1".into()),
                customer_id: None,
                access_scope: Default::default(),
                custom_role_id: Some(role.id.clone()),
            })
            .unwrap();

        assert!(svc.delete_custom_role(&role.id).is_err());

        svc.delete_user(&user.id).unwrap();
        svc.delete_custom_role(&role.id).unwrap();
    }

    #[test]
    fn test_dangling_template_degrades_to_none() {
        let svc = test_service();
        let role = svc
            .create_custom_role(CreateCustomRole {
                name: "Orphaned".into(),
                description: None,
                organization_id: Some("O1".into()),
                customer_id: None,
                template_id: Some("org_back_office".into()),
                overrides: vec![],
            })
            .unwrap();

        // Simulate catalogue drift: the template disappears.
        svc.delete_record("role_templates", "org_back_office").unwrap();

        let fetched = svc.get_custom_role(&role.id).unwrap();
        assert!(fetched.template.is_none());
    }
}
