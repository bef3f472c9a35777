//! Settlement of funding intents: webhook confirmation of QR payments and
//! administrator review of slips.
//!
//! Each settlement reads the intent, decides, transitions and credits inside one
//! IMMEDIATE transaction. Concurrent callers for the same intent queue on the
//! write lock; the loser sees a terminal status and gets `AlreadyProcessed`.

use rusqlite::{Connection, TransactionBehavior};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::ledger::{self, Credit, Resolution};
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::events::{DomainEvent, EventBus};
use crate::models::{FundingIntent, FundingMethod, FundingStatus, ReviewDecision};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub intent: FundingIntent,
    /// Balance after the credit. None when the intent closed without one.
    pub new_balance: Option<i64>,
}

/// Report a credit whose owner vanished. The intent is already terminal.
fn credit_lost(events: &EventBus, intent: &FundingIntent) -> AppError {
    tracing::error!(
        intent_id = %intent.id,
        user_id = %intent.user_id,
        points = intent.points_to_credit,
        "Funding intent settled but its account no longer exists; credit lost"
    );
    events.publish(DomainEvent::CreditLost {
        intent_id: intent.id.clone(),
        user_id: intent.user_id.clone(),
        points: intent.points_to_credit,
    });
    AppError::AccountNotFound(intent.user_id.clone())
}

/// Confirm a QR payment reported by the payment webhook.
pub fn confirm_payment(
    conn: &mut Connection,
    events: &EventBus,
    reference: &str,
    presented: Decimal,
    now: i64,
) -> Result<Settlement> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let intent = queries::get_funding_intent_by_reference(&tx, reference)?
        .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;

    if intent.method != FundingMethod::Qr {
        return Err(AppError::BadRequest(
            "Only QR payments can be confirmed by webhook".into(),
        ));
    }
    if intent.status.is_terminal() {
        return Err(AppError::AlreadyProcessed);
    }

    if intent.is_past_deadline(now) {
        let expired = ledger::transition(&tx, &intent, FundingStatus::Expired, None, now)?;
        tx.commit()?;
        tracing::info!(intent_id = %expired.id, "Payment confirmation arrived after expiry");
        events.publish(DomainEvent::IntentExpired {
            intent_id: expired.id.clone(),
            user_id: expired.user_id.clone(),
            reference: expired.reference.clone(),
        });
        return Err(AppError::Expired);
    }

    // Decimal equality ignores scale, so 100.370 matches 100.37 and sub-satang
    // values never match.
    if presented != intent.amount_decimal() {
        let failed = ledger::transition(&tx, &intent, FundingStatus::Failed, None, now)?;
        tx.commit()?;
        tracing::warn!(
            intent_id = %failed.id,
            expected = %failed.amount_decimal(),
            presented = %presented,
            "Payment amount mismatch"
        );
        events.publish(DomainEvent::PaymentFailed {
            intent_id: failed.id.clone(),
            user_id: failed.user_id.clone(),
            reference: failed.reference.clone(),
            reason: "amount_mismatch".into(),
        });
        return Err(AppError::AmountMismatch {
            expected: failed.amount_decimal(),
            presented,
        });
    }

    let completed = ledger::transition(&tx, &intent, FundingStatus::Completed, None, now)?;
    let credit = ledger::apply_credit(&tx, &completed, now)?;
    tx.commit()?;

    let Credit::Applied { new_balance } = credit else {
        return Err(credit_lost(events, &completed));
    };

    tracing::info!(
        intent_id = %completed.id,
        user_id = %completed.user_id,
        points = completed.points_to_credit,
        new_balance,
        "Payment confirmed"
    );
    events.publish(DomainEvent::PaymentCompleted {
        intent_id: completed.id.clone(),
        user_id: completed.user_id.clone(),
        amount: completed.amount_decimal(),
        points: completed.points_to_credit,
        new_balance,
    });

    Ok(Settlement {
        intent: completed,
        new_balance: Some(new_balance),
    })
}

/// Approve or reject a slip intent. Slips have no deadline.
pub fn review_slip(
    conn: &mut Connection,
    events: &EventBus,
    intent_id: &str,
    approver_id: &str,
    decision: ReviewDecision,
    note: Option<&str>,
    now: i64,
) -> Result<Settlement> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let intent = queries::get_funding_intent_by_id(&tx, intent_id)?
        .ok_or_else(|| AppError::NotFound("Top-up not found".into()))?;

    if intent.method != FundingMethod::Slip {
        return Err(AppError::BadRequest("Only slip top-ups can be reviewed".into()));
    }

    let resolution = Resolution { approver_id, note };
    let reviewed = ledger::transition(&tx, &intent, decision.target_status(), Some(resolution), now)?;

    let new_balance = match decision {
        ReviewDecision::Approve => match ledger::apply_credit(&tx, &reviewed, now)? {
            Credit::Applied { new_balance } => Some(new_balance),
            Credit::AccountMissing => {
                tx.commit()?;
                return Err(credit_lost(events, &reviewed));
            }
        },
        ReviewDecision::Reject => None,
    };
    tx.commit()?;

    tracing::info!(
        intent_id = %reviewed.id,
        approver_id,
        status = reviewed.status.as_ref(),
        "Top-up reviewed"
    );
    events.publish(DomainEvent::TopupReviewed {
        intent_id: reviewed.id.clone(),
        user_id: reviewed.user_id.clone(),
        approver_id: approver_id.to_string(),
        approved: decision == ReviewDecision::Approve,
        points: reviewed.points_to_credit,
        new_balance,
    });

    Ok(Settlement {
        intent: reviewed,
        new_balance,
    })
}
