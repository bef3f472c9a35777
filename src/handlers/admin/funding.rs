use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::{AppState, ledger, queries};
use crate::error::{AppError, Result};
use crate::events::DomainEvent;
use crate::extractors::{Json, Path, Query};
use crate::middleware::AuthContext;
use crate::models::{
    AuditAction, FundingIntent, FundingMethod, FundingStatus, ReviewDecision, SetPoints,
};
use crate::pagination::{Paginated, PaginationQuery};
use crate::payments::{funding, reconcile};
use crate::util::AuditLogBuilder;

#[derive(Debug, Default, Deserialize)]
pub struct IntentFilter {
    pub status: Option<FundingStatus>,
    pub method: Option<FundingMethod>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub status: FundingStatus,
    pub new_balance: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPointsResponse {
    pub points: i64,
    pub previous: i64,
}

fn list_intents(
    state: &AppState,
    method: Option<FundingMethod>,
    status: Option<FundingStatus>,
    page: &PaginationQuery,
) -> Result<Paginated<FundingIntent>> {
    let conn = state.db.get()?;
    funding::expire_stale_intents(&conn, &state.events, queries::now())?;
    let limit = page.limit();
    let offset = page.offset();
    let (items, total) =
        queries::list_funding_intents_paginated(&conn, method, status, limit, offset)?;
    Ok(Paginated::new(items, total, limit, offset))
}

/// Slip top-ups, optionally filtered by status.
pub async fn list_topups(
    State(state): State<AppState>,
    Query(filter): Query<IntentFilter>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<FundingIntent>>> {
    Ok(Json(list_intents(
        &state,
        Some(FundingMethod::Slip),
        filter.status,
        &page,
    )?))
}

/// Every funding intent, optionally filtered by method and status.
pub async fn list_payments(
    State(state): State<AppState>,
    Query(filter): Query<IntentFilter>,
    Query(page): Query<PaginationQuery>,
) -> Result<Json<Paginated<FundingIntent>>> {
    Ok(Json(list_intents(&state, filter.method, filter.status, &page)?))
}

/// The review body is optional; an empty one means "no note".
fn parse_review(body: &Bytes) -> Result<ReviewRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ReviewRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON: {}", e)))
}

fn record_review(
    state: &AppState,
    ctx: &AuthContext,
    headers: &HeaderMap,
    intent: &FundingIntent,
    decision: ReviewDecision,
    note: Option<&str>,
) -> Result<()> {
    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, headers)
        .actor(&ctx.user.id)
        .action(match decision {
            ReviewDecision::Approve => AuditAction::ApproveTopup,
            ReviewDecision::Reject => AuditAction::RejectTopup,
        })
        .resource("funding_intent", &intent.id)
        .details(&json!({
            "user_id": intent.user_id,
            "points": intent.points_to_credit,
            "note": note,
        }))
        .save()?;
    Ok(())
}

async fn review(
    state: AppState,
    ctx: AuthContext,
    headers: HeaderMap,
    id: String,
    decision: ReviewDecision,
    body: Bytes,
) -> Result<Json<ReviewResponse>> {
    let input = parse_review(&body)?;
    let mut conn = state.db.get()?;
    let note = input.note.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let settlement = reconcile::review_slip(
        &mut conn,
        &state.events,
        &id,
        &ctx.user.id,
        decision,
        note,
        queries::now(),
    )?;

    // Review already committed; audit failures are only logged.
    if let Err(e) = record_review(&state, &ctx, &headers, &settlement.intent, decision, note) {
        tracing::error!(intent_id = %id, error = %e, "Failed to write audit log for top-up review");
    }

    Ok(Json(ReviewResponse {
        status: settlement.intent.status,
        new_balance: settlement.new_balance,
    }))
}

pub async fn approve_topup(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ReviewResponse>> {
    review(state, ctx, headers, id, ReviewDecision::Approve, body).await
}

pub async fn reject_topup(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ReviewResponse>> {
    review(state, ctx, headers, id, ReviewDecision::Reject, body).await
}

/// Overwrite a user's balance.
pub async fn set_user_points(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<SetPoints>,
) -> Result<Json<SetPointsResponse>> {
    let mut conn = state.db.get()?;
    let adjustment = ledger::set_points(&mut conn, &id, input.points, &ctx.user.id, queries::now())?;

    let audit_conn = state.audit.get()?;
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers)
        .actor(&ctx.user.id)
        .action(AuditAction::SetPoints)
        .resource("user", &id)
        .details(&json!({
            "previous": adjustment.previous,
            "current": adjustment.current,
        }))
        .save()?;

    tracing::info!(
        user_id = %id,
        actor_id = %ctx.user.id,
        previous = adjustment.previous,
        current = adjustment.current,
        "Points set by administrator"
    );
    state.events.publish(DomainEvent::PointsAdjusted {
        user_id: id,
        actor_id: ctx.user.id.clone(),
        previous: adjustment.previous,
        current: adjustment.current,
    });

    Ok(Json(SetPointsResponse {
        points: adjustment.current,
        previous: adjustment.previous,
    }))
}
