use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};

use emitrace_core::{ListParams, ServiceError};

use crate::api::{Actor, AppState};
use crate::model::{CreateCustomer, CreateLink, DecideLink};
use crate::registry::ResourceKind;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list_customers).post(register_customer))
        .route("/customers/{id}", get(get_customer))
        .route("/links", axum::routing::post(request_link))
        .route("/links/{id}", get(get_link))
        .route("/links/{id}/status", put(decide_link))
}

/// GET /iam/customers — list customers visible to the actor.
///
/// The handler applies the actor's tenant scope to the result set; the
/// permission check alone never widens visibility.
async fn list_customers(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "customer.view").map_err(ServiceError::from)?;

    let user = svc.load_user(&actor.0).map_err(ServiceError::from)?;
    let scope = svc
        .build_scope(&user, ResourceKind::Customer)
        .map_err(ServiceError::from)?;

    let result = svc.list_customers(&params).map_err(ServiceError::from)?;
    let items: Vec<_> = result
        .items
        .into_iter()
        .filter(|c| scope.allows(&c.id))
        .collect();

    Ok(Json(serde_json::json!({
        "total": items.len(),
        "items": items,
    })))
}

async fn register_customer(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(input): Json<CreateCustomer>,
) -> Result<(axum::http::StatusCode, Json<serde_json::Value>), ServiceError> {
    svc.require(&actor.0, "customer.create").map_err(ServiceError::from)?;
    let customer = svc
        .register_customer(input, &actor.0)
        .map_err(ServiceError::from)?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(serde_json::to_value(customer).unwrap()),
    ))
}

async fn get_customer(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "customer.view").map_err(ServiceError::from)?;

    let user = svc.load_user(&actor.0).map_err(ServiceError::from)?;
    let scope = svc
        .build_scope(&user, ResourceKind::Customer)
        .map_err(ServiceError::from)?;

    let customer = svc.get_customer(&id).map_err(ServiceError::from)?;
    if !scope.allows(&customer.id) {
        // Outside the tenant scope a record does not exist.
        return Err(ServiceError::NotFound(format!("customer '{}' not found", id)));
    }
    Ok(Json(serde_json::to_value(customer).unwrap()))
}

async fn request_link(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(input): Json<CreateLink>,
) -> Result<(axum::http::StatusCode, Json<serde_json::Value>), ServiceError> {
    svc.require(&actor.0, "customer.update").map_err(ServiceError::from)?;
    let link = svc.request_link(input, &actor.0).map_err(ServiceError::from)?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(serde_json::to_value(link).unwrap()),
    ))
}

async fn get_link(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "customer.view").map_err(ServiceError::from)?;
    let link = svc.get_link(&id).map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(link).unwrap()))
}

async fn decide_link(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(input): Json<DecideLink>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "customer.update").map_err(ServiceError::from)?;
    let link = svc.decide_link(&id, input.status).map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(link).unwrap()))
}
