use axum::extract::{Extension, State};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::licensing;
use crate::middleware::AuthContext;
use crate::models::{LicenseWithScript, SetServerAddress};

pub async fn list_purchases(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Vec<LicenseWithScript>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_licenses_for_user(&conn, &ctx.user.id)?))
}

pub async fn get_purchase(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<LicenseWithScript>> {
    let conn = state.db.get()?;
    let purchase = queries::get_license_with_script(&conn, &id)?
        .filter(|p| p.license.user_id == ctx.user.id)
        .ok_or_else(|| AppError::NotFound("Purchase not found".into()))?;
    Ok(Json(purchase))
}

/// Look up one of the caller's purchases by license key.
pub async fn get_purchase_by_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(key): Path<String>,
) -> Result<Json<LicenseWithScript>> {
    let conn = state.db.get()?;
    let purchase = queries::get_license_with_script_by_key(&conn, key.trim())?
        .filter(|p| p.license.user_id == ctx.user.id)
        .ok_or_else(|| AppError::NotFound("License not found".into()))?;
    Ok(Json(purchase))
}

/// Bind a purchase to the owner's game server. Allowed once.
pub async fn set_server_address(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(input): Json<SetServerAddress>,
) -> Result<Json<LicenseWithScript>> {
    let conn = state.db.get()?;
    licensing::set_owner_server_address(
        &conn,
        &state.events,
        &ctx.user.id,
        &id,
        &input.server_address,
    )?;
    let purchase = queries::get_license_with_script(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Purchase not found".into()))?;
    Ok(Json(purchase))
}
