mod assignments;
mod check;
mod customers;
mod middleware;
mod roles;
mod templates;
mod users;

use std::sync::Arc;

use axum::Router;

use crate::service::IamService;

pub use middleware::Actor;

/// Shared application state.
pub type AppState = Arc<IamService>;

/// Build the complete IAM API router.
///
/// Routes are nested under `/iam`. `/iam/check` and `/iam/scope` are
/// internal contracts for other services; everything else is the admin
/// surface, gated by the actor middleware plus per-handler permission
/// checks.
pub fn build_router(svc: Arc<IamService>) -> Router {
    let api = Router::new()
        .merge(check::routes())
        .merge(templates::routes())
        .merge(roles::routes())
        .merge(users::routes())
        .merge(assignments::routes())
        .merge(customers::routes());

    Router::new()
        .nest("/iam", api)
        .layer(axum::middleware::from_fn_with_state(
            svc.clone(),
            middleware::actor_middleware,
        ))
        .with_state(svc)
}
