//! JSON RPC handlers, one module per service.
//!
//! Every route here sits behind [`crate::auth::authorize_rpc`], so handlers
//! only run for callers whose session the operation tolerates.

pub mod enrollment;
pub mod health;
pub mod login;
pub mod reflection;
pub mod session;
pub mod user;

use axum::{Router, middleware, routing::post};
use portcullis_authz::Operation;
use portcullis_store::Database;
use std::sync::Arc;

use crate::auth::authorize_rpc;
use crate::state::AppState;

/// Operations that need a ceremony verifier to be served.
#[must_use]
pub fn is_ceremony(operation: Operation) -> bool {
    matches!(
        operation,
        Operation::StartEnrollment
            | Operation::FinishEnrollment
            | Operation::StartLogin
            | Operation::FinishLogin
    )
}

/// Routes for every served operation, guarded by the authorization hook.
pub fn routes<D: Database>(state: &Arc<AppState<D>>) -> Router<Arc<AppState<D>>> {
    let mut router = Router::new()
        .route(Operation::HealthCheck.path(), post(health::check))
        .route(
            Operation::ListOperations.path(),
            post(reflection::list_operations::<D>),
        )
        .route(Operation::WhoAmI.path(), post(user::who_am_i))
        .route(Operation::EditUser.path(), post(user::edit::<D>))
        .route(
            Operation::GenerateEnrollmentLink.path(),
            post(user::generate_enrollment_link::<D>),
        )
        .route(
            Operation::AuthorizeHttp.path(),
            post(session::authorize_http::<D>),
        );

    if state.verifier.is_some() {
        router = router
            .route(Operation::StartEnrollment.path(), post(enrollment::start::<D>))
            .route(Operation::FinishEnrollment.path(), post(enrollment::finish::<D>))
            .route(Operation::StartLogin.path(), post(login::start::<D>))
            .route(Operation::FinishLogin.path(), post(login::finish::<D>));
    }

    router.route_layer(middleware::from_fn_with_state(
        Arc::clone(state),
        authorize_rpc::<D>,
    ))
}
