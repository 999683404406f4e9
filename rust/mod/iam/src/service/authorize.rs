use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::model::{PermissionCode, ResolvedUser, SystemRole};
use crate::registry::ResourceKind;
use crate::resolver::{self, PermissionSet};
use crate::scope::{ActingAs, ScopePredicate};
use crate::service::{IamError, IamService};

/// Per-user cache of resolved permission sets.
///
/// No TTL: entries live until explicitly invalidated. Every write path
/// that can change a user's effective permissions (user overrides,
/// custom-role edits, template changes) must invalidate, or resolution
/// would go stale — this is the contract that makes caching safe at all.
pub struct ResolutionCache {
    entries: RwLock<HashMap<String, PermissionSet>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, user_id: &str) -> Option<PermissionSet> {
        let entries = self.entries.read().unwrap();
        entries.get(user_id).cloned()
    }

    pub fn set(&self, user_id: &str, set: PermissionSet) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(user_id.to_string(), set);
    }

    /// Invalidate a specific user's entry.
    pub fn invalidate(&self, user_id: &str) {
        let mut entries = self.entries.write().unwrap();
        entries.remove(user_id);
    }

    /// Invalidate all entries. Used after role-level changes, which can
    /// affect any number of users.
    pub fn invalidate_all(&self) {
        let mut entries = self.entries.write().unwrap();
        entries.clear();
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameters for the `/iam/check` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckParams {
    pub user_id: String,
    pub code: String,
}

/// Result of a permission check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub allowed: bool,
    /// The pattern that granted the code, if allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
}

impl IamService {
    // ── Contract 1: permission gate ──

    /// Whether the loaded user may perform the operation named by
    /// `code`. Pure function of the loaded records; a malformed code is
    /// never granted.
    pub fn has_permission(&self, user: &ResolvedUser, code: &str) -> bool {
        resolver::has_permission(user, &self.registry, code)
    }

    /// Permission check by user id, for the check endpoint and the
    /// route middleware. Resolution is cached per user and invalidated
    /// on every override write.
    pub fn check(&self, user_id: &str, code: &str) -> Result<CheckResult, IamError> {
        let code: PermissionCode = code
            .parse()
            .map_err(|e| IamError::Validation(format!("{}", e)))?;

        let set = match self.resolution_cache.get(user_id) {
            Some(set) => set,
            None => {
                let user = self.load_user(user_id)?;
                let set = resolver::resolve(&user, &self.registry);
                self.resolution_cache.set(user_id, set.clone());
                set
            }
        };

        let matched = set.matching(&code).map(|p| p.to_string());
        Ok(CheckResult {
            allowed: matched.is_some(),
            matched,
        })
    }

    /// Convenience for handlers: check and turn a denial into an error.
    pub fn require(&self, user_id: &str, code: &str) -> Result<(), IamError> {
        let result = self.check(user_id, code)?;
        if result.allowed {
            Ok(())
        } else {
            Err(IamError::Forbidden(format!("missing permission '{}'", code)))
        }
    }

    // ── Contract 2: tenant scope ──

    /// Build the row-visibility predicate for a user and resource type.
    ///
    /// Independent of and stricter than the permission gate: no grant
    /// widens it. Assignment and link sets are read from the store at
    /// call time.
    pub fn build_scope(
        &self,
        user: &ResolvedUser,
        resource: ResourceKind,
    ) -> Result<ScopePredicate, IamError> {
        self.build_scope_as(user, resource, None)
    }

    /// [`IamService::build_scope`] with an optional acting-as narrowing.
    ///
    /// Only a SuperAdmin may act as a tenant; the target is validated
    /// here on every request, never trusted from client-held state.
    pub fn build_scope_as(
        &self,
        user: &ResolvedUser,
        resource: ResourceKind,
        acting: Option<&ActingAs>,
    ) -> Result<ScopePredicate, IamError> {
        // A resource type without a scope rule is a server bug, and
        // must never degrade to "unrestricted".
        if !self.registry.has_scope_rule(resource) {
            return Err(IamError::Configuration(format!(
                "no tenant scope rule registered for resource '{}'",
                resource,
            )));
        }

        if let Some(acting) = acting.filter(|a| !a.is_empty()) {
            if user.system_role != SystemRole::SuperAdmin {
                return Err(IamError::Forbidden(
                    "only SUPER_ADMIN may act as another tenant".into(),
                ));
            }
            if let Some(customer_id) = &acting.customer_id {
                return Ok(ScopePredicate::ExactCustomer(customer_id.clone()));
            }
            if let Some(organization_id) = &acting.organization_id {
                return Ok(ScopePredicate::AmongCustomers(
                    self.organization_visible_customers(organization_id)?,
                ));
            }
        }

        match user.system_role {
            SystemRole::SuperAdmin => Ok(ScopePredicate::Unrestricted),

            role if role.is_organization_side() => {
                let organization_id = user.organization_id.as_deref().ok_or_else(|| {
                    IamError::Forbidden("organization staff without an organization".into())
                })?;
                let mut visible = self.organization_visible_customers(organization_id)?;

                // Access scope is read fresh — an admin may have toggled
                // it after this user snapshot was loaded. Fall back to
                // the snapshot for users not persisted here.
                let access_scope = self
                    .get_user(&user.id)
                    .map(|u| u.access_scope)
                    .unwrap_or(user.access_scope);

                if access_scope == crate::model::AccessScope::Assigned {
                    let assigned = self.assigned_customer_ids(&user.id)?;
                    visible.retain(|id| assigned.contains(id));
                }

                Ok(ScopePredicate::AmongCustomers(visible))
            }

            // Customer-side: a single equality test. Organization
            // linkage and permission grants are deliberately ignored.
            _ => {
                let customer_id = user.customer_id.as_deref().ok_or_else(|| {
                    IamError::Forbidden("customer account without a customer".into())
                })?;
                Ok(ScopePredicate::ExactCustomer(customer_id.to_string()))
            }
        }
    }

    /// Customers visible to an organization: the ones its users created
    /// plus the ones linked with an APPROVED link.
    fn organization_visible_customers(
        &self,
        organization_id: &str,
    ) -> Result<BTreeSet<String>, IamError> {
        let mut visible = self.created_customer_ids(organization_id)?;
        visible.extend(self.linked_customer_ids(organization_id)?);
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use emitrace_sql::sqlite::SqliteStore;

    use crate::model::{
        AccessScope, CreateCustomer, CreateCustomRole, CreateLink, CreateUser, LinkStatus,
        OverrideInput, ReplaceAssignments, ResolvedUser, SetUserOverride, SystemRole,
    };
    use crate::registry::{Registry, ResourceKind};
    use crate::scope::{ActingAs, ScopePredicate};
    use crate::service::test_util::test_service;
    use crate::service::IamService;

    fn make_staff(svc: &Arc<IamService>, org: &str, role: SystemRole) -> String {
        svc.create_user(CreateUser {
            name: format!("{} staff", org),
            email: None,
            system_role: role,
            organization_id: Some(org.to_string()),
            customer_id: None,
            access_scope: AccessScope::All,
            custom_role_id: None,
        })
        .unwrap()
        .id
    }

    fn make_customer(svc: &Arc<IamService>, creator: &str, name: &str) -> String {
        svc.register_customer(
            CreateCustomer {
                name: name.to_string(),
                is_public: false,
            },
            creator,
        )
        .unwrap()
        .id
    }

    fn super_admin() -> ResolvedUser {
        ResolvedUser {
            id: "ROOT".into(),
            name: "Root".into(),
            system_role: SystemRole::SuperAdmin,
            organization_id: None,
            customer_id: None,
            access_scope: AccessScope::All,
            custom_role: None,
            overrides: vec![],
        }
    }

    #[test]
    fn test_super_admin_scope_is_unrestricted() {
        let svc = test_service();
        let scope = svc.build_scope(&super_admin(), ResourceKind::Measurement).unwrap();
        assert_eq!(scope, ScopePredicate::Unrestricted);
    }

    #[test]
    fn test_acting_as_narrows_super_admin() {
        let svc = test_service();
        let a_staff = make_staff(&svc, "A", SystemRole::OrgAdmin);
        let c1 = make_customer(&svc, &a_staff, "Plant 1");

        let acting = ActingAs {
            organization_id: None,
            customer_id: Some(c1.clone()),
        };
        let scope = svc
            .build_scope_as(&super_admin(), ResourceKind::Report, Some(&acting))
            .unwrap();
        assert_eq!(scope, ScopePredicate::ExactCustomer(c1.clone()));

        let acting = ActingAs {
            organization_id: Some("A".into()),
            customer_id: None,
        };
        let scope = svc
            .build_scope_as(&super_admin(), ResourceKind::Report, Some(&acting))
            .unwrap();
        assert!(scope.allows(&c1));
    }

    #[test]
    fn test_acting_as_rejected_for_non_super_admin() {
        let svc = test_service();
        let a_staff = make_staff(&svc, "A", SystemRole::OrgAdmin);
        let user = svc.load_user(&a_staff).unwrap();

        let acting = ActingAs {
            organization_id: Some("B".into()),
            customer_id: None,
        };
        let result = svc.build_scope_as(&user, ResourceKind::Customer, Some(&acting));
        assert!(matches!(result, Err(crate::service::IamError::Forbidden(_))));
    }

    #[test]
    fn test_organization_visibility_created_and_linked() {
        // Organization A creates C1; B holds an approved link; C holds
        // nothing.
        let svc = test_service();
        let a_staff = make_staff(&svc, "A", SystemRole::Operator);
        let b_staff = make_staff(&svc, "B", SystemRole::Operator);
        let c_staff = make_staff(&svc, "C", SystemRole::Operator);
        let c1 = make_customer(&svc, &a_staff, "Plant 1");

        let link = svc
            .request_link(
                CreateLink {
                    customer_id: c1.clone(),
                    organization_id: "B".into(),
                },
                &b_staff,
            )
            .unwrap();
        svc.decide_link(&link.id, LinkStatus::Approved).unwrap();

        for (staff, expected) in [(&a_staff, true), (&b_staff, true), (&c_staff, false)] {
            let user = svc.load_user(staff).unwrap();
            let scope = svc.build_scope(&user, ResourceKind::Measurement).unwrap();
            assert_eq!(scope.allows(&c1), expected, "staff {}", staff);
        }
    }

    #[test]
    fn test_assigned_narrowing() {
        // Organization D sees {C1, C2, C3}; an ASSIGNED staff member
        // with CustomerAssignment -> {C2} sees exactly {C2}.
        let svc = test_service();
        let admin = make_staff(&svc, "D", SystemRole::OrgAdmin);
        let staff = make_staff(&svc, "D", SystemRole::Operator);

        let customers: Vec<String> = (1..=3)
            .map(|i| make_customer(&svc, &admin, &format!("Plant {}", i)))
            .collect();

        svc.set_assignments(
            &staff,
            &ReplaceAssignments {
                customer_ids: vec![customers[1].clone()],
                primary_customer_id: Some(customers[1].clone()),
            },
            &admin,
        )
        .unwrap();
        svc.set_access_scope(&staff, AccessScope::Assigned).unwrap();

        let user = svc.load_user(&staff).unwrap();
        let scope = svc.build_scope(&user, ResourceKind::Measurement).unwrap();
        assert!(!scope.allows(&customers[0]));
        assert!(scope.allows(&customers[1]));
        assert!(!scope.allows(&customers[2]));

        // The admin keeps full visibility.
        let admin_user = svc.load_user(&admin).unwrap();
        let scope = svc.build_scope(&admin_user, ResourceKind::Measurement).unwrap();
        for c in &customers {
            assert!(scope.allows(c));
        }
    }

    #[test]
    fn test_access_scope_read_at_query_time() {
        let svc = test_service();
        let admin = make_staff(&svc, "D", SystemRole::OrgAdmin);
        let staff = make_staff(&svc, "D", SystemRole::Operator);
        let c1 = make_customer(&svc, &admin, "Plant 1");
        let c2 = make_customer(&svc, &admin, "Plant 2");

        svc.set_assignments(
            &staff,
            &ReplaceAssignments {
                customer_ids: vec![c1.clone()],
                primary_customer_id: None,
            },
            &admin,
        )
        .unwrap();

        // Snapshot loaded while scope was still ALL.
        let user = svc.load_user(&staff).unwrap();
        assert_eq!(user.access_scope, AccessScope::All);

        // Admin toggles after the load; the next scope build sees it.
        svc.set_access_scope(&staff, AccessScope::Assigned).unwrap();
        let scope = svc.build_scope(&user, ResourceKind::Customer).unwrap();
        assert!(scope.allows(&c1));
        assert!(!scope.allows(&c2));
    }

    #[test]
    fn test_customer_scope_is_equality_regardless_of_grants() {
        let svc = test_service();

        // Custom role granting everything, plus a user override for
        // good measure — none of it may widen tenant scope.
        let role = svc
            .create_custom_role(CreateCustomRole {
                name: "Omnipotent on paper".into(),
                description: None,
                organization_id: None,
                customer_id: Some("C1".into()),
                template_id: None,
                overrides: vec![OverrideInput {
                    pattern: "*".into(),
                    granted: true,
                }],
            })
            .unwrap();

        let user = svc
            .create_user(CreateUser {
                name: "Plant admin".into(),
                email: None,
                system_role: SystemRole::CustomerAdmin,
                organization_id: None,
                customer_id: Some("C1".into()),
                access_scope: AccessScope::All,
                custom_role_id: Some(role.id.clone()),
            })
            .unwrap();
        svc.set_user_override(
            &user.id,
            SetUserOverride {
                pattern: "*".into(),
                granted: true,
                reason: Some("stress the isolation invariant".into()),
            },
            "ROOT",
        )
        .unwrap();

        let resolved = svc.load_user(&user.id).unwrap();
        assert!(svc.has_permission(&resolved, "measurement.delete"));

        for kind in [
            ResourceKind::Customer,
            ResourceKind::Stack,
            ResourceKind::Measurement,
            ResourceKind::Report,
            ResourceKind::Communication,
        ] {
            let scope = svc.build_scope(&resolved, kind).unwrap();
            assert_eq!(scope, ScopePredicate::ExactCustomer("C1".into()));
            assert!(!scope.allows("C2"));
        }
    }

    #[test]
    fn test_unregistered_resource_fails_loudly() {
        let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
        let svc = IamService::new(sql, Registry::empty()).unwrap();

        let result = svc.build_scope(&super_admin(), ResourceKind::Customer);
        assert!(matches!(
            result,
            Err(crate::service::IamError::Configuration(_))
        ));
    }

    #[test]
    fn test_check_uses_cache_until_invalidated() {
        let svc = test_service();
        let staff = make_staff(&svc, "A", SystemRole::Operator);

        assert!(svc.check(&staff, "measurement.create").unwrap().allowed);

        // Revoking via a user override must invalidate the cached set.
        svc.set_user_override(
            &staff,
            SetUserOverride {
                pattern: "measurement.*".into(),
                granted: false,
                reason: None,
            },
            "ROOT",
        )
        .unwrap();
        assert!(!svc.check(&staff, "measurement.create").unwrap().allowed);

        // And removing the override restores the baseline.
        svc.remove_user_override(&staff, "measurement.*").unwrap();
        assert!(svc.check(&staff, "measurement.create").unwrap().allowed);
    }

    #[test]
    fn test_check_rejects_malformed_code() {
        let svc = test_service();
        let staff = make_staff(&svc, "A", SystemRole::OrgAdmin);
        assert!(svc.check(&staff, "customer.*").is_err());
        assert!(svc.check(&staff, "nonsense").is_err());
    }

    #[test]
    fn test_require_maps_denial_to_forbidden() {
        let svc = test_service();
        let staff = make_staff(&svc, "A", SystemRole::Operator);
        assert!(svc.require(&staff, "measurement.create").is_ok());
        assert!(matches!(
            svc.require(&staff, "user.delete"),
            Err(crate::service::IamError::Forbidden(_))
        ));
    }

    #[test]
    fn test_concurrent_reader_sees_old_or_new_assignments() {
        let svc = test_service();
        let admin = make_staff(&svc, "D", SystemRole::OrgAdmin);
        let staff = make_staff(&svc, "D", SystemRole::Operator);
        let c_old = make_customer(&svc, &admin, "Old plant");
        let c_new = make_customer(&svc, &admin, "New plant");

        svc.set_assignments(
            &staff,
            &ReplaceAssignments {
                customer_ids: vec![c_old.clone()],
                primary_customer_id: Some(c_old.clone()),
            },
            &admin,
        )
        .unwrap();

        let writer = {
            let svc = Arc::clone(&svc);
            let staff = staff.clone();
            let admin = admin.clone();
            let c_new = c_new.clone();
            std::thread::spawn(move || {
                svc.set_assignments(
                    &staff,
                    &ReplaceAssignments {
                        customer_ids: vec![c_new.clone()],
                        primary_customer_id: Some(c_new),
                    },
                    &admin,
                )
                .unwrap();
            })
        };

        // Every read during the replace is either the old set or
        // exactly the new one — never empty, never mixed.
        for _ in 0..50 {
            let ids = svc.assigned_customer_ids(&staff).unwrap();
            let old: std::collections::BTreeSet<String> = [c_old.clone()].into();
            let new: std::collections::BTreeSet<String> = [c_new.clone()].into();
            assert!(ids == old || ids == new, "observed partial set {:?}", ids);
        }

        writer.join().unwrap();
        let ids = svc.assigned_customer_ids(&staff).unwrap();
        assert!(ids.contains(&c_new));
    }
}
