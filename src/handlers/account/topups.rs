use axum::{
    extract::{Extension, Multipart, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::middleware::AuthContext;
use crate::models::{FundingIntent, FundingMethod, FundingStatus};
use crate::payments::funding::{self, IntentRequest};
use crate::uploads::image_extension;

const HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopupResponse {
    pub intent_id: String,
    pub reference: String,
    pub status: FundingStatus,
    pub amount: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopupHistoryQuery {
    pub method: Option<FundingMethod>,
}

/// Submit a bank-transfer slip for manual review.
///
/// Multipart fields: `amount` (baht) and `slip` (JPEG or PNG image).
pub async fn submit_topup(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<TopupResponse>)> {
    let mut amount: Option<Decimal> = None;
    let mut slip: Option<(&'static str, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "amount" => {
                let text = field.text().await?;
                let parsed = text
                    .trim()
                    .parse::<Decimal>()
                    .map_err(|_| AppError::InvalidAmount("Amount must be a number".into()))?;
                amount = Some(parsed);
            }
            "slip" => {
                let extension = image_extension(field.file_name(), field.content_type())?;
                let bytes = field.bytes().await?;
                slip = Some((extension, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let amount = amount.ok_or_else(|| AppError::BadRequest("Amount is required".into()))?;
    let (extension, bytes) =
        slip.ok_or_else(|| AppError::BadRequest("Slip image is required".into()))?;

    // Reject bad amounts before anything touches the disk.
    funding::validate_amount(amount, state.payments.max_amount_minor)?;

    let evidence_url = state.slips.save(extension, &bytes).await?;

    let created = {
        let conn = state.db.get()?;
        funding::create_intent(
            &conn,
            &state.payments,
            &state.events,
            &IntentRequest {
                user_id: &ctx.user.id,
                amount,
                method: FundingMethod::Slip,
                evidence_url: Some(&evidence_url),
            },
            queries::now(),
        )
    };

    let intent = match created {
        Ok(intent) => intent,
        Err(e) => {
            state.slips.discard(&evidence_url).await;
            return Err(e);
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(TopupResponse {
            amount: intent.amount_decimal(),
            intent_id: intent.id,
            reference: intent.reference,
            status: intent.status,
        }),
    ))
}

/// The caller's funding history, newest first.
pub async fn list_topups(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(query): Query<TopupHistoryQuery>,
) -> Result<Json<Vec<FundingIntent>>> {
    let conn = state.db.get()?;
    let now = queries::now();
    let intents = queries::list_funding_intents_for_user(&conn, &ctx.user.id, query.method, HISTORY_LIMIT)?
        .into_iter()
        .map(|intent| funding::refresh_intent(&conn, &state.events, intent, now))
        .collect::<Result<Vec<_>>>()?;
    Ok(Json(intents))
}
