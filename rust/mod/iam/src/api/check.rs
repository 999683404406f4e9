use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use emitrace_core::ServiceError;

use crate::api::AppState;
use crate::registry::ResourceKind;
use crate::scope::{ActingAs, ScopePredicate};
use crate::service::authorize::CheckParams;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/check", get(check_permission))
        .route("/scope", get(build_scope))
}

/// GET /iam/check?user_id=..&code=measurement.create
///
/// Returns { "allowed": true/false, "matched": "measurement.*" }.
async fn check_permission(
    State(svc): State<AppState>,
    Query(params): Query<CheckParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let result = svc
        .check(&params.user_id, &params.code)
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(result).unwrap()))
}

#[derive(Debug, Deserialize)]
struct ScopeParams {
    user_id: String,
    resource: String,
    #[serde(default)]
    acting_organization_id: Option<String>,
    #[serde(default)]
    acting_customer_id: Option<String>,
}

/// GET /iam/scope?user_id=..&resource=measurement
///
/// Returns the tenant-scope predicate the caller must apply to its
/// query. Acting-as parameters are honored for SuperAdmin only.
async fn build_scope(
    State(svc): State<AppState>,
    Query(params): Query<ScopeParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    let resource: ResourceKind = params
        .resource
        .parse()
        .map_err(ServiceError::Validation)?;

    let user = svc.load_user(&params.user_id).map_err(ServiceError::from)?;

    let acting = ActingAs {
        organization_id: params.acting_organization_id,
        customer_id: params.acting_customer_id,
    };
    let acting = if acting.is_empty() { None } else { Some(acting) };

    let scope = svc
        .build_scope_as(&user, resource, acting.as_ref())
        .map_err(ServiceError::from)?;

    Ok(Json(render_scope(&scope)))
}

fn render_scope(scope: &ScopePredicate) -> serde_json::Value {
    match scope {
        ScopePredicate::Unrestricted => serde_json::json!({"scope": "unrestricted"}),
        ScopePredicate::AmongCustomers(ids) => serde_json::json!({
            "scope": "among_customers",
            "customer_ids": ids.iter().collect::<Vec<_>>(),
        }),
        ScopePredicate::ExactCustomer(id) => serde_json::json!({
            "scope": "exact_customer",
            "customer_id": id,
        }),
    }
}
