//! Effective permission resolution.
//!
//! A user's effective permission set is computed by four layers, each
//! applied in order and each able to add or remove patterns:
//!
//! 1. system-role base grants from the [`Registry`]
//! 2. template defaults of the user's custom role (union)
//! 3. the custom role's override list, in stored order
//! 4. the user's own override list — final say
//!
//! Removal is pattern-exact: revoking `customer.view` does not narrow a
//! `customer.*` grant that is also present. The resolver is a pure
//! function of the loaded records; it performs no I/O.

use std::collections::BTreeSet;

use crate::model::{Pattern, PermissionCode, ResolvedUser};
use crate::registry::Registry;

/// The resolved set of granted patterns for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    patterns: BTreeSet<Pattern>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pattern: Pattern) {
        self.patterns.insert(pattern);
    }

    /// Remove exactly this pattern. No semantic subtraction: removing
    /// `customer.view` leaves a present `customer.*` untouched.
    pub fn remove(&mut self, pattern: &Pattern) {
        self.patterns.remove(pattern);
    }

    /// Whether the set grants the given exact code.
    pub fn grants(&self, code: &PermissionCode) -> bool {
        self.matching(code).is_some()
    }

    /// The pattern that grants the code, if any. Global wins, then the
    /// exact pattern, then the resource wildcard.
    pub fn matching(&self, code: &PermissionCode) -> Option<&Pattern> {
        if let Some(p) = self.patterns.get(&Pattern::Global) {
            return Some(p);
        }
        if let Some(p) = self.patterns.get(&Pattern::Exact {
            resource: code.resource.clone(),
            action: code.action.clone(),
        }) {
            return Some(p);
        }
        self.patterns.get(&Pattern::Resource(code.resource.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl FromIterator<Pattern> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Pattern>>(iter: I) -> Self {
        Self {
            patterns: iter.into_iter().collect(),
        }
    }
}

/// Compute the effective permission set for a loaded user.
pub fn resolve(user: &ResolvedUser, registry: &Registry) -> PermissionSet {
    let mut set = PermissionSet::new();

    // Layer 1: system-role base grants. A role the registry does not
    // know resolves to nothing.
    for p in registry.base_grants(user.system_role) {
        set.insert(p.clone());
    }

    // Layers 2 + 3: custom role, when present. A dangling reference was
    // already degraded to None by the loader.
    if let Some(role) = &user.custom_role {
        if let Some(template) = &role.template {
            for p in &template.default_permissions {
                set.insert(p.clone());
            }
        }
        for ov in &role.overrides {
            if ov.granted {
                set.insert(ov.pattern.clone());
            } else {
                set.remove(&ov.pattern);
            }
        }
    }

    // Layer 4: user-level overrides override everything before them.
    for ov in &user.overrides {
        if ov.granted {
            set.insert(ov.pattern.clone());
        } else {
            set.remove(&ov.pattern);
        }
    }

    set
}

/// Whether the user may perform the operation named by `code`.
///
/// A string that is not a well-formed exact code is never granted —
/// fail closed, not an error.
pub fn has_permission(user: &ResolvedUser, registry: &Registry, code: &str) -> bool {
    let code: PermissionCode = match code.parse() {
        Ok(c) => c,
        Err(_) => return false,
    };
    resolve(user, registry).grants(&code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use emitrace_core::now_rfc3339;

    use crate::model::{
        AccessScope, CustomRole, RoleCategory, RoleOverride, RoleTemplate, SystemRole,
        UserPermissionOverride,
    };

    fn org_user(role: SystemRole) -> ResolvedUser {
        ResolvedUser {
            id: "U1".into(),
            name: "Test".into(),
            system_role: role,
            organization_id: Some("O1".into()),
            customer_id: None,
            access_scope: AccessScope::All,
            custom_role: None,
            overrides: vec![],
        }
    }

    fn template(patterns: &[&str]) -> RoleTemplate {
        RoleTemplate {
            id: "tpl".into(),
            name: "Template".into(),
            category: RoleCategory::Organization,
            default_permissions: patterns.iter().map(|p| p.parse().unwrap()).collect(),
            created_at: now_rfc3339(),
        }
    }

    fn custom_role(
        template: Option<RoleTemplate>,
        overrides: Vec<RoleOverride>,
    ) -> CustomRole {
        CustomRole {
            id: "R1".into(),
            name: "Custom".into(),
            description: None,
            organization_id: Some("O1".into()),
            customer_id: None,
            template_id: template.as_ref().map(|t| t.id.clone()),
            template,
            overrides,
            created_at: now_rfc3339(),
            updated_at: now_rfc3339(),
        }
    }

    fn user_override(pattern: &str, granted: bool) -> UserPermissionOverride {
        UserPermissionOverride {
            pattern: pattern.parse().unwrap(),
            granted,
            granted_by: "ADMIN".into(),
            reason: None,
            created_at: now_rfc3339(),
        }
    }

    #[test]
    fn test_super_admin_has_everything() {
        let user = ResolvedUser {
            organization_id: None,
            ..org_user(SystemRole::SuperAdmin)
        };
        let reg = Registry::builtin();
        for code in ["customer.delete", "measurement.import", "role.create", "user.delete"] {
            assert!(has_permission(&user, &reg, code), "denied {}", code);
        }
    }

    #[test]
    fn test_unmapped_role_resolves_empty() {
        let user = org_user(SystemRole::OrgAdmin);
        let empty = Registry::empty();
        assert!(resolve(&user, &empty).is_empty());
        assert!(!has_permission(&user, &empty, "customer.view"));
    }

    #[test]
    fn test_template_union() {
        let mut user = org_user(SystemRole::Operator);
        user.custom_role = Some(custom_role(Some(template(&["role.view"])), vec![]));
        let reg = Registry::builtin();
        // From the baseline:
        assert!(has_permission(&user, &reg, "measurement.create"));
        // From the template:
        assert!(has_permission(&user, &reg, "role.view"));
    }

    #[test]
    fn test_role_override_revokes_template_default() {
        let mut user = org_user(SystemRole::Operator);
        user.custom_role = Some(custom_role(
            Some(template(&["report.view"])),
            vec![RoleOverride {
                pattern: "report.view".parse().unwrap(),
                granted: false,
            }],
        ));
        // Operator baseline also grants report.view exactly; the role
        // override removes that exact pattern from the running set.
        let reg = Registry::builtin();
        assert!(!has_permission(&user, &reg, "report.view"));
    }

    #[test]
    fn test_user_override_beats_role_override() {
        let mut user = org_user(SystemRole::Operator);
        user.custom_role = Some(custom_role(
            None,
            vec![RoleOverride {
                pattern: "measurement.create".parse().unwrap(),
                granted: true,
            }],
        ));
        user.overrides = vec![user_override("measurement.create", false)];
        let reg = Registry::builtin();
        // The role grants it, the user-level override revokes it — but
        // the Operator baseline holds measurement.* which is a different
        // pattern and survives. Drop the wildcard too to isolate layers.
        user.overrides.push(user_override("measurement.*", false));
        assert!(!has_permission(&user, &reg, "measurement.create"));
    }

    #[test]
    fn test_user_override_grants_on_top() {
        let mut user = org_user(SystemRole::Operator);
        user.overrides = vec![user_override("role.view", true)];
        let reg = Registry::builtin();
        assert!(has_permission(&user, &reg, "role.view"));
    }

    #[test]
    fn test_removal_is_pattern_exact() {
        // Revoking the exact code does not narrow a wildcard that is
        // also present.
        let mut user = org_user(SystemRole::OrgAdmin);
        user.overrides = vec![user_override("customer.view", false)];
        let reg = Registry::builtin();
        // OrgAdmin baseline holds customer.* — still matches.
        assert!(has_permission(&user, &reg, "customer.view"));

        // Revoking the wildcard itself does take effect.
        user.overrides.push(user_override("customer.*", false));
        assert!(!has_permission(&user, &reg, "customer.view"));
    }

    #[test]
    fn test_override_list_order_matters() {
        let mut user = org_user(SystemRole::Operator);
        user.custom_role = Some(custom_role(
            None,
            vec![
                RoleOverride {
                    pattern: "role.view".parse().unwrap(),
                    granted: true,
                },
                RoleOverride {
                    pattern: "role.view".parse().unwrap(),
                    granted: false,
                },
            ],
        ));
        let reg = Registry::builtin();
        assert!(!has_permission(&user, &reg, "role.view"));
    }

    #[test]
    fn test_wildcard_matching() {
        let set: PermissionSet = ["customer.*".parse::<Pattern>().unwrap()]
            .into_iter()
            .collect();
        assert!(set.grants(&"customer.view".parse().unwrap()));
        assert!(set.grants(&"customer.create".parse().unwrap()));
        assert!(!set.grants(&"stack.view".parse().unwrap()));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut user = org_user(SystemRole::OrgAdmin);
        user.custom_role = Some(custom_role(
            Some(template(&["report.view", "report.download"])),
            vec![RoleOverride {
                pattern: "report.download".parse().unwrap(),
                granted: false,
            }],
        ));
        user.overrides = vec![user_override("measurement.export", true)];
        let reg = Registry::builtin();
        assert_eq!(resolve(&user, &reg), resolve(&user, &reg));
    }

    #[test]
    fn test_malformed_code_fails_closed() {
        let user = ResolvedUser {
            organization_id: None,
            ..org_user(SystemRole::SuperAdmin)
        };
        let reg = Registry::builtin();
        assert!(!has_permission(&user, &reg, "not a code"));
        assert!(!has_permission(&user, &reg, "customer.*"));
    }
}
