use emitrace_core::{ListParams, ListResult, now_rfc3339};
use emitrace_sql::Value;
use tracing::info;

use crate::model::{Pattern, RoleCategory, RoleTemplate};
use crate::service::{IamError, IamService};

/// Builtin template catalogue: (id, name, category, default patterns).
///
/// Seeded once at startup; tenants reference but never edit these.
const BUILTIN_TEMPLATES: &[(&str, &str, RoleCategory, &[&str])] = &[
    (
        "org_measurement_lead",
        "Measurement lead",
        RoleCategory::Organization,
        &[
            "measurement.*",
            "report.*",
            "stack.view",
            "stack.update",
            "communication.view",
            "communication.create",
        ],
    ),
    (
        "org_back_office",
        "Back office",
        RoleCategory::Organization,
        &[
            "customer.view",
            "customer.update",
            "communication.*",
            "report.view",
            "report.download",
        ],
    ),
    (
        "customer_compliance_officer",
        "Compliance officer",
        RoleCategory::Customer,
        &[
            "customer.view",
            "stack.view",
            "measurement.view",
            "measurement.export",
            "report.view",
            "report.download",
            "communication.view",
            "communication.create",
        ],
    ),
    (
        "customer_viewer",
        "Viewer",
        RoleCategory::Customer,
        &["customer.view", "stack.view", "measurement.view", "report.view"],
    ),
];

impl IamService {
    /// Seed the builtin role templates. Existing entries are left
    /// untouched; missing ones are created.
    pub(crate) fn seed_templates(&self) -> Result<(), IamError> {
        for (id, name, category, patterns) in BUILTIN_TEMPLATES {
            if self.get_record::<RoleTemplate>("role_templates", id).is_ok() {
                continue;
            }

            let default_permissions: Vec<Pattern> = patterns
                .iter()
                .map(|p| {
                    p.parse().map_err(|e| {
                        IamError::Configuration(format!("builtin template '{}': {}", id, e))
                    })
                })
                .collect::<Result<_, _>>()?;

            let template = RoleTemplate {
                id: id.to_string(),
                name: name.to_string(),
                category: *category,
                default_permissions,
                created_at: now_rfc3339(),
            };

            self.insert_record(
                "role_templates",
                id,
                &template,
                &[
                    ("category", Value::Text(category.as_str().to_string())),
                    ("created_at", Value::Text(template.created_at.clone())),
                ],
            )?;
            info!(template = id, "seeded role template");
        }
        Ok(())
    }

    /// Get a role template by id.
    pub fn get_template(&self, id: &str) -> Result<RoleTemplate, IamError> {
        self.get_record("role_templates", id)
    }

    /// List role templates with pagination.
    pub fn list_templates(
        &self,
        params: &ListParams,
    ) -> Result<ListResult<RoleTemplate>, IamError> {
        let (items, total) =
            self.list_records("role_templates", &[], params.limit, params.offset)?;
        Ok(ListResult { items, total })
    }
}
