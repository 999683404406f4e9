use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Extension, Json, Router};

use emitrace_core::{ListParams, ServiceError};

use crate::api::{Actor, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/templates", get(list_templates))
        .route("/catalogue", get(catalogue))
}

async fn list_templates(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "role.view").map_err(ServiceError::from)?;
    let result = svc.list_templates(&params).map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({
        "items": result.items,
        "total": result.total,
    })))
}

/// The known resource/action pairs. Admin UIs use this to offer only
/// patterns that will validate at grant time.
async fn catalogue(
    State(svc): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    svc.require(&actor.0, "role.view").map_err(ServiceError::from)?;
    Ok(Json(serde_json::to_value(svc.registry().catalogue()).unwrap()))
}
