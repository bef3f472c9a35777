use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use serde::Serialize;

use crate::db::{AppState, ledger, queries};
use crate::error::{AppError, Result};
use crate::events::DomainEvent;
use crate::extractors::{Json, Path};
use crate::middleware::AuthContext;
use crate::models::{AddCartItem, CartItem};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub items: Vec<CartItem>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasedItem {
    pub id: String,
    pub license: String,
    pub script_id: String,
    pub script_name: String,
    pub resource_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub remaining_points: i64,
    pub total_cost: i64,
    pub purchases: Vec<PurchasedItem>,
}

fn load_cart(conn: &rusqlite::Connection, user_id: &str) -> Result<CartResponse> {
    let items = queries::list_cart_items(conn, user_id)?;
    let total = items.iter().map(|item| item.price).sum();
    Ok(CartResponse { items, total })
}

pub async fn get_cart(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<CartResponse>> {
    let conn = state.db.get()?;
    Ok(Json(load_cart(&conn, &ctx.user.id)?))
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<AddCartItem>,
) -> Result<(StatusCode, Json<CartResponse>)> {
    let conn = state.db.get()?;
    if queries::get_script_by_id(&conn, &input.script_id)?.is_none() {
        return Err(AppError::NotFound("Script not found".into()));
    }
    if !queries::add_cart_item(&conn, &ctx.user.id, &input.script_id)? {
        return Err(AppError::Conflict("Item already in cart".into()));
    }
    Ok((StatusCode::CREATED, Json(load_cart(&conn, &ctx.user.id)?)))
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(script_id): Path<String>,
) -> Result<Json<CartResponse>> {
    let conn = state.db.get()?;
    if !queries::remove_cart_item(&conn, &ctx.user.id, &script_id)? {
        return Err(AppError::NotFound("Item not in cart".into()));
    }
    Ok(Json(load_cart(&conn, &ctx.user.id)?))
}

/// Spend points on everything in the cart.
pub async fn checkout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<CheckoutResponse>> {
    let mut conn = state.db.get()?;
    let receipt = ledger::checkout_cart(&mut conn, &ctx.user.id, queries::now())?;

    tracing::info!(
        user_id = %ctx.user.id,
        licenses = receipt.licenses.len(),
        total = receipt.total,
        "Checkout completed"
    );
    state.events.publish(DomainEvent::CheckoutCompleted {
        user_id: ctx.user.id.clone(),
        license_count: receipt.licenses.len(),
        total: receipt.total,
        new_balance: receipt.new_balance,
    });

    let purchases = receipt
        .licenses
        .into_iter()
        .zip(receipt.items)
        .map(|(license, item)| PurchasedItem {
            id: license.id,
            license: license.license_key,
            script_id: license.script_id,
            script_name: item.name,
            resource_name: item.resource_name,
        })
        .collect();

    Ok(Json(CheckoutResponse {
        remaining_points: receipt.new_balance,
        total_cost: receipt.total,
        purchases,
    }))
}
