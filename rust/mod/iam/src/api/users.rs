use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;

use emitrace_core::{ListParams, ServiceError};

use crate::api::{Actor, AppState};
use crate::model::{AccessScope, CreateUser, SetUserOverride};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).delete(delete_user))
        .route("/users/{id}/access-scope", put(set_access_scope))
        .route("/users/{id}/role", put(set_custom_role))
        .route(
            "/users/{id}/overrides",
            get(list_overrides).post(set_override).delete(remove_override),
        )
        .route("/users/{id}/resolved", get(resolved_permissions))
}

#[derive(Debug, Deserialize)]
struct UserFilter {
    #[serde(default)]
    organization_id: Option<String>,
    #[serde(default)]
    customer_id: Option<String>,
}

async fn list_users(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(filter): Query<UserFilter>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "user.view").map_err(ServiceError::from)?;
    let result = svc
        .list_users(
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

async fn create_user(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(input): Json<CreateUser>,
) -> Result<(axum::http::StatusCode, Json<serde_json::Value>), ServiceError> {
    svc.require(&actor.0, "user.create").map_err(ServiceError::from)?;
    let user = svc.create_user(input).map_err(ServiceError::from)?;
    Ok((axum::http::StatusCode::CREATED, Json(serde_json::to_value(user).unwrap())))
}

async fn get_user(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "user.view").map_err(ServiceError::from)?;
    let user = svc.get_user(&id).map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(user).unwrap()))
}

async fn delete_user(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, ServiceError> {
    svc.require(&actor.0, "user.delete").map_err(ServiceError::from)?;
    svc.delete_user(&id).map_err(ServiceError::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct SetAccessScope {
    access_scope: AccessScope,
}

async fn set_access_scope(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(input): Json<SetAccessScope>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "user.update").map_err(ServiceError::from)?;
    let user = svc
        .set_access_scope(&id, input.access_scope)
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(user).unwrap()))
}

#[derive(Debug, Deserialize)]
struct SetCustomRole {
    #[serde(default)]
    custom_role_id: Option<String>,
}

async fn set_custom_role(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(input): Json<SetCustomRole>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "user.update").map_err(ServiceError::from)?;
    let user = svc
        .set_custom_role(&id, input.custom_role_id)
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(user).unwrap()))
}

async fn list_overrides(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "user.view").map_err(ServiceError::from)?;
    let overrides = svc.list_user_overrides(&id).map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(overrides).unwrap()))
}

async fn set_override(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(input): Json<SetUserOverride>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "user.update").map_err(ServiceError::from)?;
    let ov = svc
        .set_user_override(&id, input, &actor.0)
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(ov).unwrap()))
}

#[derive(Debug, Deserialize)]
struct OverridePattern {
    pattern: String,
}

async fn remove_override(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Query(query): Query<OverridePattern>,
) -> Result<axum::http::StatusCode, ServiceError> {
    svc.require(&actor.0, "user.update").map_err(ServiceError::from)?;
    svc.remove_user_override(&id, &query.pattern)
        .map_err(ServiceError::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// GET /iam/users/{id}/resolved — the user's effective permission set,
/// for admin inspection.
async fn resolved_permissions(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "user.view").map_err(ServiceError::from)?;
    let user = svc.load_user(&id).map_err(ServiceError::from)?;
    let set = crate::resolver::resolve(&user, svc.registry());
    let patterns: Vec<String> = set.iter().map(|p| p.to_string()).collect();
    Ok(Json(serde_json::json!({ "patterns": patterns })))
}
