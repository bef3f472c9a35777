mod funding;
mod purchases;
mod scripts;
mod users;

pub use funding::*;
pub use purchases::*;
pub use scripts::*;
pub use users::*;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::services::ServeDir;

use crate::db::AppState;
use crate::middleware::{Capability, require};
use crate::models::Permission;
use crate::uploads::SLIP_URL_PREFIX;

fn guarded(state: &AppState, permission: Permission, routes: Router<AppState>) -> Router<AppState> {
    routes.route_layer(middleware::from_fn_with_state(
        state.clone(),
        require(Capability::Permission(permission)),
    ))
}

pub fn router(state: AppState) -> Router<AppState> {
    let points = Router::new()
        .route("/admin/topups", get(list_topups))
        .route("/admin/topups/{id}/approve", post(approve_topup))
        .route("/admin/topups/{id}/reject", post(reject_topup))
        .route("/admin/payments", get(list_payments))
        .route("/admin/users/{id}/points", put(set_user_points))
        .nest_service(SLIP_URL_PREFIX, ServeDir::new(&state.slips.dir));

    let users = Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}", get(get_user).put(update_user_roles));

    let purchases = Router::new()
        .route("/admin/purchases", get(list_purchases))
        .route("/admin/purchases/{id}", get(get_purchase).put(update_purchase));

    let scripts = Router::new()
        .route("/admin/scripts", post(create_script))
        .route("/admin/scripts/{id}", put(update_script));

    Router::new()
        .merge(guarded(&state, Permission::ManagePoints, points))
        .merge(guarded(&state, Permission::ManageUsers, users))
        .merge(guarded(&state, Permission::ManagePurchases, purchases))
        .merge(guarded(&state, Permission::ManageScripts, scripts))
}
