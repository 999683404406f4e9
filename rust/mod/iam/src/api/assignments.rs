use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Extension, Json, Router};

use emitrace_core::ServiceError;

use crate::api::{Actor, AppState};
use crate::model::ReplaceAssignments;

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/users/{id}/assignments",
        get(list_assignments).put(replace_assignments),
    )
}

async fn list_assignments(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "assignment.view").map_err(ServiceError::from)?;
    let assignments = svc.list_assignments(&id).map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(assignments).unwrap()))
}

/// PUT /iam/users/{id}/assignments — atomic replace of the user's
/// customer portfolio.
async fn replace_assignments(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    Json(input): Json<ReplaceAssignments>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "assignment.update").map_err(ServiceError::from)?;
    let assignments = svc
        .set_assignments(&id, &input, &actor.0)
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(assignments).unwrap()))
}
