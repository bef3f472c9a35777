mod payments;

pub use payments::*;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/payments/verify", post(handle_payment_verification))
}
