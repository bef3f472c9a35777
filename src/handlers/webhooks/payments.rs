use axum::{body::Bytes, extract::State, http::HeaderMap};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::payments::{reconcile, verify_webhook_signature};

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub reference: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub new_balance: Option<i64>,
}

/// Payment-provider callback reporting that a QR payment arrived.
pub async fn handle_payment_verification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VerifyPaymentResponse>> {
    if let Some(secret) = &state.payments.webhook_secret {
        let signature = headers
            .get("x-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;
        if !verify_webhook_signature(secret, &body, signature)? {
            tracing::warn!("Payment webhook signature mismatch");
            return Err(AppError::Unauthorized);
        }
    }

    let request: VerifyPaymentRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON: {}", e)))?;

    let mut conn = state.db.get()?;
    let settlement = reconcile::confirm_payment(
        &mut conn,
        &state.events,
        request.reference.trim(),
        request.amount,
        queries::now(),
    )?;

    Ok(Json(VerifyPaymentResponse {
        success: true,
        new_balance: settlement.new_balance,
    }))
}
