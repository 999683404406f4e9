//! Pluggable request gate backed by the IAM engine.
//!
//! Business modules (measurements, reporting, ...) do not depend on the
//! iam crate's internals; their route layers know only the
//! [`Authenticator`] trait from `emitrace-core`. This is the concrete
//! implementation injected at startup.

use std::sync::Arc;

use axum::http::HeaderMap;

use emitrace_core::{Authenticator, ServiceError};

use crate::service::IamService;

/// Header stamped by the upstream session layer after authentication.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// [`Authenticator`] implementation that resolves the actor from the
/// request headers and checks the permission code against their
/// effective permission set.
pub struct IamAuthenticator {
    service: Arc<IamService>,
}

impl IamAuthenticator {
    pub fn new(service: Arc<IamService>) -> Self {
        Self { service }
    }
}

impl Authenticator for IamAuthenticator {
    fn check(&self, headers: &HeaderMap, code: &str) -> Result<(), ServiceError> {
        let actor_id = headers
            .get(ACTOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("missing x-actor-id header".into()))?;

        self.service
            .require(actor_id, code)
            .map_err(ServiceError::from)
    }
}
