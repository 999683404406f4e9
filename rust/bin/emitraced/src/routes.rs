//! Route registration — collects module routes + system endpoints.

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

/// Build the complete router with all routes.
///
/// Module routes are already `Router<()>` (they called `.with_state()`
/// internally) and mount under their own prefix.
pub fn build_router(module_routes: Vec<(&str, Router)>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/version", get(version));

    for (name, router) in module_routes {
        tracing::info!(module = name, "mounting module routes");
        app = app.merge(router);
    }

    app
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
    }))
}

async fn version() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": "emitraced",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
