use axum::{
    extract::{Extension, State},
    http::StatusCode,
};
use rusqlite::TransactionBehavior;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::AuthContext;
use crate::models::{FundingMethod, FundingStatus, minor_to_decimal};
use crate::payments::{
    funding::{self, IntentRequest},
    promptpay,
};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub reference: String,
    /// `data:` URL of the QR image.
    pub qr_image: String,
    pub payload: String,
    /// Exact amount to transfer, including salt.
    pub amount: Decimal,
    pub requested_amount: Decimal,
    pub points_to_credit: i64,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub reference: String,
    pub status: FundingStatus,
    pub amount: Decimal,
    pub points_to_credit: i64,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

/// Start a QR top-up.
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>)> {
    promptpay::normalize_account(&state.payments.promptpay_id)?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let intent = funding::insert_intent(
        &tx,
        &state.payments,
        &IntentRequest {
            user_id: &ctx.user.id,
            amount: input.amount,
            method: FundingMethod::Qr,
            evidence_url: None,
        },
        queries::now(),
    )?;

    // Dropping the transaction on error discards the intent.
    let payload = promptpay::generate_payload(&state.payments.promptpay_id, intent.amount_decimal())?;
    let qr_image = state.qr.render(&payload)?;
    tx.commit()?;
    funding::publish_created(&state.events, &intent);

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            reference: intent.reference.clone(),
            qr_image,
            payload,
            amount: intent.amount_decimal(),
            requested_amount: minor_to_decimal(intent.requested_amount),
            points_to_credit: intent.points_to_credit,
            expires_at: intent.expires_at,
        }),
    ))
}

/// Poll a payment. Only the payer can see it; anyone else gets 404.
pub async fn get_payment_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(reference): Path<String>,
) -> Result<Json<PaymentStatusResponse>> {
    let conn = state.db.get()?;
    let intent = queries::get_funding_intent_by_reference(&conn, &reference)?
        .filter(|i| i.user_id == ctx.user.id)
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;
    let intent = funding::refresh_intent(&conn, &state.events, intent, queries::now())?;

    Ok(Json(PaymentStatusResponse {
        amount: intent.amount_decimal(),
        reference: intent.reference,
        status: intent.status,
        points_to_credit: intent.points_to_credit,
        expires_at: intent.expires_at,
        created_at: intent.created_at,
    }))
}
