use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, middleware::Next};
use serde_json::json;

use crate::api::AppState;

/// Paths served to trusted internal callers (other services' route
/// layers); they carry the subject user id explicitly instead of an
/// actor header.
const INTERNAL_PATHS: &[&str] = &["/iam/check", "/iam/scope"];

/// The authenticated actor of an admin request, as stamped into the
/// `x-actor-id` header by the upstream session layer.
#[derive(Debug, Clone)]
pub struct Actor(pub String);

/// Actor-resolution middleware.
///
/// Admin routes require `x-actor-id` to name an existing user; the
/// resolved [`Actor`] is stored as an Extension for handlers to gate
/// their action with `IamService::require`.
pub async fn actor_middleware(
    State(svc): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();

    if INTERNAL_PATHS.iter().any(|p| path.starts_with(p)) {
        return next.run(req).await;
    }

    let actor_id = match req
        .headers()
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
    {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "missing x-actor-id header"})),
            )
                .into_response();
        }
    };

    match svc.get_user(&actor_id) {
        Ok(_) => {
            req.extensions_mut().insert(Actor(actor_id));
            next.run(req).await
        }
        Err(_) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unknown actor"})),
        )
            .into_response(),
    }
}
