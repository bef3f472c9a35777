mod licenses;
mod scripts;

pub use licenses::*;
pub use scripts::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/scripts", get(list_scripts))
        .route("/scripts/{id}", get(get_script))
        .route("/licenses/verify", post(verify_license))
}
