//! Funding intent creation and expiry.

use std::time::Duration;

use rand::{Rng, RngCore};
use rusqlite::Connection;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;

use crate::db::{DbPool, ledger, queries};
use crate::error::{AppError, Result};
use crate::events::{DomainEvent, EventBus};
use crate::models::{
    CreateFundingIntent, FundingIntent, FundingMethod, FundingStatus, minor_to_decimal,
};

use super::{PaymentSettings, to_minor_units};

const MIN_AMOUNT_MINOR: i64 = 100;
const MAX_SALT_ATTEMPTS: usize = 10;

pub struct IntentRequest<'a> {
    pub user_id: &'a str,
    pub amount: Decimal,
    pub method: FundingMethod,
    /// Stored slip image. Required for slip intents, ignored for QR ones.
    pub evidence_url: Option<&'a str>,
}

/// 16 hex characters from 8 random bytes.
pub fn generate_reference() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validate a requested amount and return it in satang.
pub fn validate_amount(amount: Decimal, max_minor: i64) -> Result<i64> {
    let minor = to_minor_units(amount)?;
    if minor < MIN_AMOUNT_MINOR {
        return Err(AppError::InvalidAmount("Amount must be at least 1".into()));
    }
    if minor > max_minor {
        return Err(AppError::InvalidAmount(format!(
            "Amount cannot exceed {}",
            minor_to_decimal(max_minor)
        )));
    }
    Ok(minor)
}

/// Add 1-99 satang so the charged amount differs from every other pending
/// intent. Falls back to the last candidate when no free salt turns up.
fn salted_amount(conn: &Connection, base: i64, now: i64) -> Result<i64> {
    let mut rng = rand::thread_rng();
    let mut candidate = base;
    for _ in 0..MAX_SALT_ATTEMPTS {
        candidate = base + rng.gen_range(1..=99);
        if !queries::pending_amount_in_use(conn, candidate, now)? {
            return Ok(candidate);
        }
    }
    tracing::warn!(base, candidate, "No collision-free salt found for funding amount");
    Ok(candidate)
}

/// Persist a new pending intent and announce it.
pub fn create_intent(
    conn: &Connection,
    settings: &PaymentSettings,
    events: &EventBus,
    request: &IntentRequest<'_>,
    now: i64,
) -> Result<FundingIntent> {
    let intent = insert_intent(conn, settings, request, now)?;
    publish_created(events, &intent);
    Ok(intent)
}

/// Persist a new pending intent without publishing it. Callers that insert
/// inside a transaction publish with [`publish_created`] after commit.
///
/// `pointsToCredit` is the whole-baht part of the requested amount; any salt
/// added to a QR amount is never credited.
pub fn insert_intent(
    conn: &Connection,
    settings: &PaymentSettings,
    request: &IntentRequest<'_>,
    now: i64,
) -> Result<FundingIntent> {
    let requested = validate_amount(request.amount, settings.max_amount_minor)?;
    let points_to_credit = requested / 100;

    let (amount, expires_at, evidence_url) = match request.method {
        FundingMethod::Qr => {
            let amount = if settings.salt_enabled {
                salted_amount(conn, requested, now)?
            } else {
                requested
            };
            (amount, Some(now + settings.intent_ttl_secs), None)
        }
        FundingMethod::Slip => {
            let evidence = request
                .evidence_url
                .ok_or_else(|| AppError::BadRequest("Slip image is required".into()))?;
            (requested, None, Some(evidence))
        }
    };

    let reference = generate_reference();
    let intent = queries::create_funding_intent(
        conn,
        &CreateFundingIntent {
            user_id: request.user_id,
            method: request.method,
            amount,
            requested_amount: requested,
            points_to_credit,
            reference: &reference,
            expires_at,
            evidence_url,
        },
        now,
    )?;

    tracing::info!(
        intent_id = %intent.id,
        user_id = %intent.user_id,
        method = intent.method.as_ref(),
        amount = %intent.amount_decimal(),
        "Funding intent created"
    );
    Ok(intent)
}

pub fn publish_created(events: &EventBus, intent: &FundingIntent) {
    events.publish(DomainEvent::IntentCreated {
        intent_id: intent.id.clone(),
        user_id: intent.user_id.clone(),
        method: intent.method,
        amount: intent.amount_decimal(),
        reference: intent.reference.clone(),
    });
}

fn publish_expired(events: &EventBus, intent: &FundingIntent) {
    events.publish(DomainEvent::IntentExpired {
        intent_id: intent.id.clone(),
        user_id: intent.user_id.clone(),
        reference: intent.reference.clone(),
    });
}

/// Expire every pending QR intent whose deadline has passed. Returns how many moved.
pub fn expire_stale_intents(conn: &Connection, events: &EventBus, now: i64) -> Result<usize> {
    let expired = queries::expire_stale_intents(conn, now)?;
    for intent in &expired {
        publish_expired(events, intent);
    }
    if !expired.is_empty() {
        tracing::info!(count = expired.len(), "Expired stale funding intents");
    }
    Ok(expired.len())
}

/// Bring a single intent's status up to date before it is shown to anyone.
pub fn refresh_intent(
    conn: &Connection,
    events: &EventBus,
    intent: FundingIntent,
    now: i64,
) -> Result<FundingIntent> {
    if !intent.is_past_deadline(now) {
        return Ok(intent);
    }
    match ledger::transition(conn, &intent, FundingStatus::Expired, None, now) {
        Ok(expired) => {
            publish_expired(events, &expired);
            Ok(expired)
        }
        // Someone else resolved it first; report what they left behind.
        Err(AppError::AlreadyProcessed) => queries::get_funding_intent_by_id(conn, &intent.id)?
            .ok_or_else(|| AppError::NotFound("Payment not found".into())),
        Err(e) => Err(e),
    }
}

/// Periodically expire stale intents until the runtime shuts down.
pub fn spawn_expiry_sweeper(pool: DbPool, events: EventBus, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let now = chrono::Utc::now().timestamp();
            let result = pool
                .get()
                .map_err(AppError::from)
                .and_then(|conn| expire_stale_intents(&conn, &events, now));
            if let Err(e) = result {
                tracing::warn!(error = %e, "Expiry sweep failed");
            }
        }
    })
}
