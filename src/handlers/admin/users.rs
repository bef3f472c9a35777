use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::middleware::AuthContext;
use crate::models::{
    AuditAction, FundingIntent, LicenseWithScript, PointEntry, Role, UpdateUserRoles, User,
};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::AuditLogBuilder;

const DETAIL_HISTORY: i64 = 20;

#[derive(Debug, Default, Deserialize)]
pub struct UserSearch {
    /// Matches username or Discord id.
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: User,
    pub point_entries: Vec<PointEntry>,
    pub funding_intents: Vec<FundingIntent>,
    pub licenses: Vec<LicenseWithScript>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(search): Query<UserSearch>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<User>>> {
    let conn = state.db.get()?;
    let limit = page.limit();
    let offset = page.offset();
    let search = search.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let (users, total) = queries::list_users_paginated(&conn, search, limit, offset)?;
    Ok(Json(Paginated::new(users, total, limit, offset)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserDetail>> {
    let conn = state.db.get()?;
    let user = queries::get_user_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let point_entries = queries::list_point_entries_for_user(&conn, &id, DETAIL_HISTORY)?;
    let funding_intents = queries::list_funding_intents_for_user(&conn, &id, None, DETAIL_HISTORY)?;
    let licenses = queries::list_licenses_for_user(&conn, &id)?;
    Ok(Json(UserDetail {
        user,
        point_entries,
        funding_intents,
        licenses,
    }))
}

/// Change a user's role and permission grants.
pub async fn update_user_roles(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<UpdateUserRoles>,
) -> Result<Json<User>> {
    if input.role == Role::Superadmin && ctx.user.role != Role::Superadmin {
        return Err(AppError::Forbidden(
            "Only a superadmin can grant superadmin".into(),
        ));
    }
    if id == ctx.user.id && input.role < ctx.user.role {
        return Err(AppError::BadRequest("You cannot demote yourself".into()));
    }

    let conn = state.db.get()?;
    let existing = queries::get_user_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    if existing.role == Role::Superadmin && ctx.user.role != Role::Superadmin {
        return Err(AppError::Forbidden(
            "Only a superadmin can modify a superadmin".into(),
        ));
    }

    let permissions = input.normalized_permissions();
    queries::update_user_roles(&conn, &id, input.role, &permissions)?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(&ctx.user.id)
        .action(AuditAction::UpdateUserRoles)
        .resource("user", &id)
        .details(&json!({
            "old_role": existing.role,
            "new_role": input.role,
            "permissions": permissions,
        }))
        .save()?;

    let user = queries::get_user_by_id(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(user))
}
