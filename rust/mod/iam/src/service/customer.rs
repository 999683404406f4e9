use std::collections::BTreeSet;

use emitrace_core::{ListParams, ListResult, new_id, now_rfc3339};
use emitrace_sql::Value;
use tracing::info;

use crate::model::{
    CreateCustomer, CreateLink, Customer, CustomerOrganization, LinkStatus, link_id,
};
use crate::service::{IamError, IamService};

impl IamService {
    /// Register a customer. `created_by` must be an organization staff
    /// member; their organization becomes the creating organization and
    /// sees the customer without any link.
    pub fn register_customer(
        &self,
        input: CreateCustomer,
        created_by: &str,
    ) -> Result<Customer, IamError> {
        if input.name.is_empty() {
            return Err(IamError::Validation("customer name cannot be empty".into()));
        }

        let creator = self.get_user(created_by)?;
        let organization_id = match (creator.system_role.is_organization_side(), creator.organization_id) {
            (true, Some(org)) => org,
            _ => {
                return Err(IamError::Validation(
                    "customers are registered by organization staff".into(),
                ))
            }
        };

        let now = now_rfc3339();
        let customer = Customer {
            id: new_id(),
            name: input.name,
            created_by: created_by.to_string(),
            organization_id,
            is_public: input.is_public,
            created_at: now.clone(),
            updated_at: now.clone(),
        };

        self.insert_record(
            "customers",
            &customer.id,
            &customer,
            &[
                ("name", Value::Text(customer.name.clone())),
                ("organization_id", Value::Text(customer.organization_id.clone())),
                ("created_by", Value::Text(customer.created_by.clone())),
                ("is_public", Value::Integer(customer.is_public as i64)),
                ("created_at", Value::Text(now.clone())),
                ("updated_at", Value::Text(now)),
            ],
        )?;

        Ok(customer)
    }

    /// Get a customer by id.
    pub fn get_customer(&self, id: &str) -> Result<Customer, IamError> {
        self.get_record("customers", id)
    }

    /// List customers with pagination. Callers apply their tenant scope
    /// before showing results; this is the raw store access.
    pub fn list_customers(&self, params: &ListParams) -> Result<ListResult<Customer>, IamError> {
        let (items, total) = self.list_records("customers", &[], params.limit, params.offset)?;
        Ok(ListResult { items, total })
    }

    // ── Customer-organization links ──

    /// Request (or re-request) a link between a customer and an
    /// organization. Same pair → same deterministic id, so a repeat
    /// request resets a rejected link to pending instead of duplicating.
    pub fn request_link(
        &self,
        input: CreateLink,
        requested_by: &str,
    ) -> Result<CustomerOrganization, IamError> {
        let customer = self.get_customer(&input.customer_id)?;
        if customer.organization_id == input.organization_id {
            return Err(IamError::Validation(
                "the creating organization needs no link".into(),
            ));
        }

        let id = link_id(&input.customer_id, &input.organization_id);
        let now = now_rfc3339();

        if let Ok(mut existing) = self.get_record::<CustomerOrganization>("customer_links", &id) {
            if existing.status == LinkStatus::Approved {
                return Ok(existing);
            }
            existing.status = LinkStatus::Pending;
            existing.updated_at = now.clone();
            self.update_record(
                "customer_links",
                &id,
                &existing,
                &[
                    ("status", Value::Text(status_str(existing.status).into())),
                    ("updated_at", Value::Text(now)),
                ],
            )?;
            return Ok(existing);
        }

        let link = CustomerOrganization {
            id: id.clone(),
            customer_id: input.customer_id,
            organization_id: input.organization_id,
            status: LinkStatus::Pending,
            requested_by: requested_by.to_string(),
            created_at: now.clone(),
            updated_at: now.clone(),
        };

        self.insert_record(
            "customer_links",
            &id,
            &link,
            &[
                ("customer_id", Value::Text(link.customer_id.clone())),
                ("organization_id", Value::Text(link.organization_id.clone())),
                ("status", Value::Text(status_str(link.status).into())),
                ("created_at", Value::Text(now.clone())),
                ("updated_at", Value::Text(now)),
            ],
        )?;

        Ok(link)
    }

    /// Approve or reject a pending link.
    pub fn decide_link(
        &self,
        id: &str,
        status: LinkStatus,
    ) -> Result<CustomerOrganization, IamError> {
        if status == LinkStatus::Pending {
            return Err(IamError::Validation("a decision cannot be PENDING".into()));
        }

        let mut link: CustomerOrganization = self.get_record("customer_links", id)?;
        link.status = status;
        link.updated_at = now_rfc3339();

        self.update_record(
            "customer_links",
            id,
            &link,
            &[
                ("status", Value::Text(status_str(status).into())),
                ("updated_at", Value::Text(link.updated_at.clone())),
            ],
        )?;

        info!(link = id, status = status_str(status), "customer link decided");
        Ok(link)
    }

    /// Get a link by id.
    pub fn get_link(&self, id: &str) -> Result<CustomerOrganization, IamError> {
        self.get_record("customer_links", id)
    }

    // ── Link-status store (scope builder input) ──

    /// Customer ids created by the given organization's users.
    pub fn created_customer_ids(
        &self,
        organization_id: &str,
    ) -> Result<BTreeSet<String>, IamError> {
        let rows = self.sql
            .query(
                "SELECT id FROM customers WHERE organization_id = ?1",
                &[Value::Text(organization_id.to_string())],
            )
            .map_err(|e| IamError::Storage(e.to_string()))?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get_str("id").map(|s| s.to_string()))
            .collect())
    }

    /// Customer ids linked to the organization with an APPROVED link.
    /// Pending and rejected links grant nothing.
    pub fn linked_customer_ids(
        &self,
        organization_id: &str,
    ) -> Result<BTreeSet<String>, IamError> {
        let rows = self.sql
            .query(
                "SELECT customer_id FROM customer_links
                 WHERE organization_id = ?1 AND status = 'APPROVED'",
                &[Value::Text(organization_id.to_string())],
            )
            .map_err(|e| IamError::Storage(e.to_string()))?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get_str("customer_id").map(|s| s.to_string()))
            .collect())
    }
}

fn status_str(status: LinkStatus) -> &'static str {
    match status {
        LinkStatus::Pending => "PENDING",
        LinkStatus::Approved => "APPROVED",
        LinkStatus::Rejected => "REJECTED",
    }
}

#[cfg(test)]
mod tests {
    use crate::service::test_util::test_service;

    use crate::model::{CreateCustomer, CreateLink, CreateUser, LinkStatus, SystemRole};

    use std::sync::Arc;

    use crate::service::IamService;

    fn staff(svc: &Arc<IamService>, org: &str) -> String {
        svc.create_user(CreateUser {
            name: format!("{} staff", org),
            email: None,
            system_role: SystemRole::OrgAdmin,
            organization_id: Some(org.to_string()),
            customer_id: None,
            access_scope: Default::default(),
            custom_role_id: None,
        })
        .unwrap()
        .id
    }

    fn customer(svc: &Arc<IamService>, creator: &str, name: &str) -> String {
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

    #[test]
    fn test_created_set_tracks_creating_org() {
        let svc = test_service();
        let a_staff = staff(&svc, "A");
        let c1 = customer(&svc, &a_staff, "Plant 1");

        let created = svc.created_customer_ids("A").unwrap();
        assert!(created.contains(&c1));
        assert!(svc.created_customer_ids("B").unwrap().is_empty());
    }

    #[test]
    fn test_only_approved_links_count() {
        let svc = test_service();
        let a_staff = staff(&svc, "A");
        let b_staff = staff(&svc, "B");
        let c1 = customer(&svc, &a_staff, "Plant 1");

        let link = svc
            .request_link(
                CreateLink {
                    customer_id: c1.clone(),
                    organization_id: "B".into(),
                },
                &b_staff,
            )
            .unwrap();
        assert_eq!(link.status, LinkStatus::Pending);
        assert!(svc.linked_customer_ids("B").unwrap().is_empty());

        svc.decide_link(&link.id, LinkStatus::Approved).unwrap();
        assert!(svc.linked_customer_ids("B").unwrap().contains(&c1));

        svc.decide_link(&link.id, LinkStatus::Rejected).unwrap();
        assert!(svc.linked_customer_ids("B").unwrap().is_empty());
    }

    #[test]
    fn test_link_request_upserts() {
        let svc = test_service();
        let a_staff = staff(&svc, "A");
        let b_staff = staff(&svc, "B");
        let c1 = customer(&svc, &a_staff, "Plant 1");

        let first = svc
            .request_link(
                CreateLink {
                    customer_id: c1.clone(),
                    organization_id: "B".into(),
                },
                &b_staff,
            )
            .unwrap();
        svc.decide_link(&first.id, LinkStatus::Rejected).unwrap();

        // Re-request: same id, back to pending.
        let second = svc
            .request_link(
                CreateLink {
                    customer_id: c1.clone(),
                    organization_id: "B".into(),
                },
                &b_staff,
            )
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, LinkStatus::Pending);
    }

    #[test]
    fn test_creating_org_needs_no_link() {
        let svc = test_service();
        let a_staff = staff(&svc, "A");
        let c1 = customer(&svc, &a_staff, "Plant 1");

        let result = svc.request_link(
            CreateLink {
                customer_id: c1,
                organization_id: "A".into(),
            },
            &a_staff,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_customer_requires_org_creator() {
        let svc = test_service();
        let customer_user = svc
            .create_user(CreateUser {
                name: "Plant user".into(),
                email: None,
                system_role: SystemRole::CustomerAdmin,
                organization_id: None,
                customer_id: Some("C0".into()),
                access_scope: Default::default(),
                custom_role_id: None,
            })
            .unwrap();

        let result = svc.register_customer(
            CreateCustomer {
                name: "Self-registered".into(),
                is_public: false,
            },
            &customer_user.id,
        );
        assert!(result.is_err());
    }
}
