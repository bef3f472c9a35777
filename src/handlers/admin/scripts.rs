use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::AuthContext;
use crate::models::{AuditAction, CreateScript, Script, UpdateScript};
use crate::util::AuditLogBuilder;

pub async fn create_script(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Json(input): Json<CreateScript>,
) -> Result<(StatusCode, Json<Script>)> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;
    let script = queries::create_script(&conn, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(&ctx.user.id)
        .action(AuditAction::CreateScript)
        .resource("script", &script.id)
        .details(&json!({
            "name": script.name,
            "resource_name": script.resource_name,
            "price": script.price,
        }))
        .save()?;

    Ok((StatusCode::CREATED, Json(script)))
}

pub async fn update_script(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<UpdateScript>,
) -> Result<Json<Script>> {
    input.validate()?;

    let conn = state.db.get()?;
    let audit_conn = state.audit.get()?;
    let existing = queries::get_script_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Script not found".into()))?;

    queries::update_script(&conn, &id, &input)?;

    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(&ctx.user.id)
        .action(AuditAction::UpdateScript)
        .resource("script", &id)
        .details(&json!({
            "old_price": existing.price,
            "new_price": input.price,
            "name": input.name,
        }))
        .save()?;

    let script = queries::get_script_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Script not found".into()))?;
    Ok(Json(script))
}
