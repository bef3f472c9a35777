mod cart;
mod me;
mod payments;
mod purchases;
mod topups;

pub use cart::*;
pub use me::*;
pub use payments::*;
pub use purchases::*;
pub use topups::*;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};

use crate::db::AppState;
use crate::middleware::{Capability, require};

/// Multipart framing allowance on top of the slip itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: AppState) -> Router<AppState> {
    let upload_limit = state.slips.max_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/me", get(get_me))
        .route("/me/points", get(get_points))
        .route("/payments", post(create_payment))
        .route("/payments/{reference}", get(get_payment_status))
        .route(
            "/topups",
            post(submit_topup).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/topups", get(list_topups))
        .route("/cart", get(get_cart))
        .route("/cart/items", post(add_to_cart))
        .route("/cart/items/{script_id}", delete(remove_from_cart))
        .route("/cart/checkout", post(checkout))
        .route("/purchases", get(list_purchases))
        .route("/purchases/{id}", get(get_purchase))
        .route("/purchases/by-key/{key}", get(get_purchase_by_key))
        .route("/purchases/{id}/server-address", post(set_server_address))
        .route_layer(middleware::from_fn_with_state(
            state,
            require(Capability::Authenticated),
        ))
}
