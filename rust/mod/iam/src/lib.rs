//! IAM module — authorization and tenant isolation.
//!
//! Two contracts are exposed to the rest of the platform:
//!
//! - **permission gate**: `IamService::has_permission` /
//!   [`service::IamService::check`] — may this user perform this
//!   operation?
//! - **tenant scope**: [`service::IamService::build_scope`] — which rows
//!   of a shared table may this user see or mutate?
//!
//! The two are independent and layered: a route handler first gates the
//! action, then applies the scope predicate to its query. No permission
//! grant ever widens tenant scope.
//!
//! # Resources
//!
//! - **User** — identity, system role, tenant anchor, access scope
//! - **RoleTemplate** — seeded catalogue of permission sets
//! - **CustomRole** — tenant-owned role: template + ordered overrides
//! - **UserPermissionOverride** — audited per-user exception
//! - **Customer** / **CustomerOrganization** — tenant records and
//!   cross-organization links
//! - **CustomerAssignment** — personal portfolio of a staff member
//!
//! # Usage
//!
//! ```ignore
//! use iam::{IamModule, registry::Registry};
//!
//! let module = IamModule::new(sql, Registry::builtin())?;
//! let router = module.routes(); // Mount under /iam
//! ```

pub mod api;
pub mod gate;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod service;

use std::sync::Arc;

use axum::Router;

use emitrace_core::Module;
use emitrace_sql::SqlStore;

use crate::registry::Registry;
use crate::service::IamService;

/// IAM module implementing the Module trait.
///
/// Holds the IamService and provides HTTP routes for check/scope and
/// the admin surface.
pub struct IamModule {
    service: Arc<IamService>,
}

impl IamModule {
    /// Create a new IamModule.
    pub fn new(
        sql: Arc<dyn SqlStore>,
        registry: Registry,
    ) -> Result<Self, emitrace_core::ServiceError> {
        let service = IamService::new(sql, registry)
            .map_err(emitrace_core::ServiceError::from)?;
        Ok(Self { service })
    }

    /// Get a reference to the underlying IamService.
    pub fn service(&self) -> &Arc<IamService> {
        &self.service
    }
}

impl Module for IamModule {
    fn name(&self) -> &str {
        "iam"
    }

    fn routes(&self) -> Router {
        api::build_router(self.service.clone())
    }
}
