use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::licensing::validate_server_address;
use crate::middleware::AuthContext;
use crate::models::{AuditAction, LicenseWithScript, UpdateLicense};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::AuditLogBuilder;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseFilter {
    pub user_id: Option<String>,
}

pub async fn list_purchases(
    State(state): State<AppState>,
    Query(filter): Query<PurchaseFilter>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<LicenseWithScript>>> {
    let conn = state.db.get()?;
    let limit = page.limit();
    let offset = page.offset();
    let (items, total) =
        queries::list_licenses_paginated(&conn, filter.user_id.as_deref(), limit, offset)?;
    Ok(Json(Paginated::new(items, total, limit, offset)))
}

pub async fn get_purchase(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LicenseWithScript>> {
    let conn = state.db.get()?;
    let purchase = queries::get_license_with_script(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Purchase not found".into()))?;
    Ok(Json(purchase))
}

/// Revoke/reinstate a license or overwrite its server binding.
pub async fn update_purchase(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(mut input): Json<UpdateLicense>,
) -> Result<Json<LicenseWithScript>> {
    input.bound_server_address = match input.bound_server_address.take() {
        Some(Some(address)) => Some(Some(validate_server_address(&address)?)),
        other => other,
    };

    let conn = state.db.get()?;
    let existing = queries::get_license_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Purchase not found".into()))?;

    queries::update_license(&conn, &id, &input)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(&ctx.user.id)
        .action(AuditAction::UpdateLicense)
        .resource("license", &id)
        .details(&json!({
            "old_status": existing.status,
            "new_status": input.status,
            "old_server_address": existing.bound_server_address,
            "new_server_address": input.bound_server_address,
        }))
        .save()?;

    let purchase = queries::get_license_with_script(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Purchase not found".into()))?;
    Ok(Json(purchase))
}
