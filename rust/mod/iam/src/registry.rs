//! Static permission catalogue.
//!
//! The registry is assembled once at startup and shared read-only. It
//! answers three questions:
//!
//! - which patterns a system role grants out of the box
//! - whether a stored pattern refers to a real resource/action pair
//!   (writes of unknown patterns are rejected at grant time)
//! - whether a resource type participates in tenant scoping at all
//!   (asking for a scope on an unregistered type is a configuration
//!   error, never "unrestricted")

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{Pattern, SystemRole};

/// Multi-tenant resource types the scope builder knows how to scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Customer,
    Stack,
    Measurement,
    Report,
    Communication,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Customer => "customer",
            ResourceKind::Stack => "stack",
            ResourceKind::Measurement => "measurement",
            ResourceKind::Report => "report",
            ResourceKind::Communication => "communication",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(ResourceKind::Customer),
            "stack" => Ok(ResourceKind::Stack),
            "measurement" => Ok(ResourceKind::Measurement),
            "report" => Ok(ResourceKind::Report),
            "communication" => Ok(ResourceKind::Communication),
            other => Err(format!("unknown resource type '{}'", other)),
        }
    }
}

/// The assembled catalogue. See module docs.
pub struct Registry {
    base_grants: HashMap<SystemRole, Vec<Pattern>>,
    /// resource name -> known actions
    resources: BTreeMap<String, BTreeSet<String>>,
    /// resource types with a tenant-scope rule
    scoped: HashSet<ResourceKind>,
}

impl Registry {
    /// An empty registry. Every lookup fails closed: no base grants, no
    /// valid patterns, no scope rules. Useful in tests.
    pub fn empty() -> Self {
        Self {
            base_grants: HashMap::new(),
            resources: BTreeMap::new(),
            scoped: HashSet::new(),
        }
    }

    /// The production catalogue.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();

        // Resource/action catalogue. Grant-time pattern validation
        // checks against this; adding a resource here is the only way
        // to make its patterns storable.
        reg.register_resource("customer", &["view", "create", "update", "delete"]);
        reg.register_resource("stack", &["view", "create", "update", "delete"]);
        reg.register_resource(
            "measurement",
            &["view", "create", "update", "delete", "import", "export"],
        );
        reg.register_resource("report", &["view", "create", "download"]);
        reg.register_resource("communication", &["view", "create", "send"]);
        reg.register_resource("user", &["view", "create", "update", "delete"]);
        reg.register_resource("role", &["view", "create", "update", "delete"]);
        reg.register_resource("assignment", &["view", "update"]);
        reg.register_resource("organization", &["view", "update"]);

        // Tenant-scope rules exist for the shared business tables.
        for kind in [
            ResourceKind::Customer,
            ResourceKind::Stack,
            ResourceKind::Measurement,
            ResourceKind::Report,
            ResourceKind::Communication,
        ] {
            reg.register_scope_rule(kind);
        }

        // System-role base grants.
        reg.set_base_grants(SystemRole::SuperAdmin, vec![Pattern::Global]);
        reg.set_base_grants(
            SystemRole::OrgAdmin,
            pats(&[
                "customer.*",
                "stack.*",
                "measurement.*",
                "report.*",
                "communication.*",
                "user.*",
                "role.*",
                "assignment.*",
                "organization.view",
                "organization.update",
            ]),
        );
        reg.set_base_grants(
            SystemRole::Operator,
            pats(&[
                "customer.view",
                "stack.view",
                "stack.update",
                "measurement.*",
                "report.view",
                "report.create",
                "communication.view",
                "communication.create",
            ]),
        );
        reg.set_base_grants(
            SystemRole::CustomerAdmin,
            pats(&[
                "customer.view",
                "customer.update",
                "stack.view",
                "measurement.view",
                "measurement.export",
                "report.view",
                "report.download",
                "communication.view",
                "communication.create",
                "user.view",
                "user.create",
                "user.update",
            ]),
        );
        reg.set_base_grants(
            SystemRole::CustomerUser,
            pats(&[
                "customer.view",
                "stack.view",
                "measurement.view",
                "report.view",
                "report.download",
                "communication.view",
            ]),
        );
        reg.set_base_grants(
            SystemRole::CustomerSiteAdmin,
            pats(&[
                "customer.view",
                "stack.view",
                "stack.update",
                "measurement.view",
                "measurement.export",
                "report.view",
                "report.download",
                "communication.view",
                "user.view",
            ]),
        );
        reg.set_base_grants(
            SystemRole::CustomerSiteUser,
            pats(&["customer.view", "stack.view", "measurement.view", "report.view"]),
        );
        reg.set_base_grants(
            SystemRole::CustomerGroupAdmin,
            pats(&[
                "customer.view",
                "customer.update",
                "stack.view",
                "measurement.view",
                "measurement.export",
                "report.view",
                "report.download",
                "communication.view",
                "user.view",
                "user.create",
                "user.update",
            ]),
        );
        reg.set_base_grants(
            SystemRole::CustomerGroupUser,
            pats(&[
                "customer.view",
                "stack.view",
                "measurement.view",
                "report.view",
                "report.download",
            ]),
        );

        reg
    }

    pub fn register_resource(&mut self, resource: &str, actions: &[&str]) {
        self.resources.insert(
            resource.to_string(),
            actions.iter().map(|a| a.to_string()).collect(),
        );
    }

    pub fn register_scope_rule(&mut self, kind: ResourceKind) {
        self.scoped.insert(kind);
    }

    pub fn set_base_grants(&mut self, role: SystemRole, patterns: Vec<Pattern>) {
        self.base_grants.insert(role, patterns);
    }

    /// Base grants for a system role. A role without an entry resolves
    /// to no grants at all — fail closed.
    pub fn base_grants(&self, role: SystemRole) -> &[Pattern] {
        self.base_grants.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether a tenant-scope rule is registered for the resource type.
    pub fn has_scope_rule(&self, kind: ResourceKind) -> bool {
        self.scoped.contains(&kind)
    }

    /// Validate a pattern against the catalogue. Called before any
    /// override/grant is persisted; unknown resources or actions are
    /// rejected so a typo can never become a silently dead grant.
    pub fn validate_pattern(&self, pattern: &Pattern) -> Result<(), String> {
        match pattern {
            Pattern::Global => Ok(()),
            Pattern::Resource(resource) => {
                if self.resources.contains_key(resource) {
                    Ok(())
                } else {
                    Err(format!("unknown resource '{}'", resource))
                }
            }
            Pattern::Exact { resource, action } => match self.resources.get(resource) {
                None => Err(format!("unknown resource '{}'", resource)),
                Some(actions) if !actions.contains(action) => {
                    Err(format!("unknown action '{}' for resource '{}'", action, resource))
                }
                Some(_) => Ok(()),
            },
        }
    }

    /// The resource/action catalogue, for the introspection endpoint.
    pub fn catalogue(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.resources
    }
}

fn pats(strs: &[&str]) -> Vec<Pattern> {
    strs.iter()
        .map(|s| s.parse().expect("builtin pattern must parse"))
        .collect()
}
