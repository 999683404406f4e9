//! Request-gating trait for the HTTP layer.
//!
//! The server binary does NOT depend on any specific authorization
//! module. It only knows this trait; the concrete implementation (the
//! iam module's permission checker) is injected at startup time.

use axum::http::HeaderMap;

use crate::ServiceError;

/// Pluggable request gate. The route layer calls this before any
/// handler whose action is bound to a permission code.
///
/// The check receives the request headers (the upstream session layer
/// has already authenticated the caller and stamped their identity into
/// a header) and the exact `resource.action` code for the operation.
pub trait Authenticator: Send + Sync + 'static {
    /// Check whether the request may perform the given operation.
    ///
    /// - `headers`: the HTTP request headers
    /// - `code`: exact permission code, e.g. `"measurement.create"`
    /// - Returns `Ok(())` if allowed, `Err(ServiceError)` otherwise.
    fn check(&self, headers: &HeaderMap, code: &str) -> Result<(), ServiceError>;
}

/// A no-op gate that allows everything. Used for testing and for
/// public-only route trees.
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn check(&self, _headers: &HeaderMap, _code: &str) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// A gate that denies everything. Used for testing.
pub struct DenyAll;

impl Authenticator for DenyAll {
    fn check(&self, _headers: &HeaderMap, _code: &str) -> Result<(), ServiceError> {
        Err(ServiceError::PermissionDenied("access denied".into()))
    }
}
