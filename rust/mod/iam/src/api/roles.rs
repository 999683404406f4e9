use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;

use emitrace_core::{ListParams, ServiceError};

use crate::api::{Actor, AppState};
use crate::model::{CreateCustomRole, OverrideInput};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/{id}", get(get_role).put(update_role).delete(delete_role))
        .route("/roles/{id}/overrides", put(replace_overrides))
}

#[derive(Debug, Deserialize)]
struct RoleFilter {
    #[serde(default)]
    organization_id: Option<String>,
    #[serde(default)]
    customer_id: Option<String>,
}

async fn list_roles(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(filter): Query<RoleFilter>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "role.view").map_err(ServiceError::from)?;
    let result = svc
        .list_custom_roles(
            filter.organization_id.as_deref(),
            filter.customer_id.as_deref(),
            &params,
        )
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

async fn create_role(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(input): Json<CreateCustomRole>,
) -> Result<(axum::http::StatusCode, Json<serde_json::Value>), ServiceError> {
    svc.require(&actor.0, "role.create").map_err(ServiceError::from)?;
    let role = svc.create_custom_role(input).map_err(ServiceError::from)?;
    Ok((axum::http::StatusCode::CREATED, Json(serde_json::to_value(role).unwrap())))
}

async fn get_role(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "role.view").map_err(ServiceError::from)?;
    let role = svc.get_custom_role(&id).map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(role).unwrap()))
}

async fn update_role(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "role.update").map_err(ServiceError::from)?;
    let role = svc.update_custom_role(&id, patch).map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(role).unwrap()))
}

async fn delete_role(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, ServiceError> {
    svc.require(&actor.0, "role.delete").map_err(ServiceError::from)?;
    svc.delete_custom_role(&id).map_err(ServiceError::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// PUT /iam/roles/{id}/overrides — wholesale replace of the override
/// list, atomically.
async fn replace_overrides(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(overrides): Json<Vec<OverrideInput>>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "role.update").map_err(ServiceError::from)?;
    let role = svc
        .replace_role_overrides(&id, &overrides)
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(role).unwrap()))
}
