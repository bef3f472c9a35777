//! Balance mutations. Every function here runs inside a caller-supplied
//! IMMEDIATE transaction or opens one itself, so a balance is never read
//! and written in separate critical sections.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::licensing::generate_license_key;
use crate::models::*;

use super::queries::{gen_id, list_cart_items};

/// Who closed an intent and why. Only slip reviews carry one.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    pub approver_id: &'a str,
    pub note: Option<&'a str>,
}

/// Move a pending intent to `to`.
///
/// The UPDATE only matches rows still in `pending`, so a caller racing another
/// resolver gets `AlreadyProcessed` rather than a second transition.
pub fn transition(
    conn: &Connection,
    intent: &FundingIntent,
    to: FundingStatus,
    resolution: Option<Resolution<'_>>,
    now: i64,
) -> Result<FundingIntent> {
    if intent.status.is_terminal() {
        return Err(AppError::AlreadyProcessed);
    }
    if !intent.status.can_transition(to, intent.method) {
        return Err(AppError::BadRequest(format!(
            "A {} payment cannot become {}",
            intent.method.as_ref(),
            to.as_ref()
        )));
    }

    let approver_id = resolution.map(|r| r.approver_id);
    let note = resolution.and_then(|r| r.note);
    let affected = conn.execute(
        "UPDATE funding_intents
         SET status = ?1, resolved_at = ?2, approver_id = ?3, review_note = ?4
         WHERE id = ?5 AND status = 'pending'",
        params![to.as_ref(), now, approver_id, note, &intent.id],
    )?;
    if affected == 0 {
        return Err(AppError::AlreadyProcessed);
    }

    Ok(FundingIntent {
        status: to,
        resolved_at: Some(now),
        approver_id: approver_id.map(String::from),
        review_note: note.map(String::from),
        ..intent.clone()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credit {
    Applied { new_balance: i64 },
    /// The intent's owner no longer exists. Nothing was written.
    AccountMissing,
}

/// Add an intent's points to its owner's balance and record the ledger entry.
///
/// Must run in the same transaction as the `transition` that made the intent
/// `completed` or `approved`. The UNIQUE intent_id on point_entries makes a
/// second credit for the same intent fail instead of double-counting.
pub fn apply_credit(conn: &Connection, intent: &FundingIntent, now: i64) -> Result<Credit> {
    let new_balance: Option<i64> = conn
        .query_row(
            "UPDATE users SET points = points + ?1, updated_at = ?2 WHERE id = ?3 RETURNING points",
            params![intent.points_to_credit, now, &intent.user_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(new_balance) = new_balance else {
        return Ok(Credit::AccountMissing);
    };

    conn.execute(
        "INSERT INTO point_entries (id, user_id, delta, balance_after, reason, intent_id, actor_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            gen_id(),
            &intent.user_id,
            intent.points_to_credit,
            new_balance,
            PointReason::Funding.as_ref(),
            &intent.id,
            &intent.approver_id,
            now
        ],
    )?;

    Ok(Credit::Applied { new_balance })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub licenses: Vec<LicenseGrant>,
    /// Cart lines as charged, in the same order as `licenses`.
    pub items: Vec<CartItem>,
    pub total: i64,
    pub new_balance: i64,
}

/// Convert the user's cart into licenses, debiting the cart total.
///
/// The balance check, debit, license inserts and cart clear share one IMMEDIATE
/// transaction: either all of them land or none do.
pub fn checkout_cart(conn: &mut Connection, user_id: &str, now: i64) -> Result<CheckoutReceipt> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let items = list_cart_items(&tx, user_id)?;
    if items.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let total: i64 = items.iter().map(|item| item.price).sum();
    let new_balance: Option<i64> = tx
        .query_row(
            "UPDATE users SET points = points - ?1, updated_at = ?2
             WHERE id = ?3 AND points >= ?1 RETURNING points",
            params![total, now, user_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(new_balance) = new_balance else {
        let current: i64 = tx
            .query_row(
                "SELECT points FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        return Err(AppError::InsufficientPoints {
            required: total,
            current,
        });
    };

    tx.execute(
        "INSERT INTO point_entries (id, user_id, delta, balance_after, reason, intent_id, actor_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6)",
        params![
            gen_id(),
            user_id,
            -total,
            new_balance,
            PointReason::Purchase.as_ref(),
            now
        ],
    )?;

    let mut licenses = Vec::with_capacity(items.len());
    for item in &items {
        let license = LicenseGrant {
            id: gen_id(),
            user_id: user_id.to_string(),
            script_id: item.script_id.clone(),
            license_key: generate_license_key(),
            price_paid: item.price,
            bound_server_address: None,
            status: LicenseStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tx.execute(
            "INSERT INTO licenses (id, user_id, script_id, license_key, price_paid, bound_server_address, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, ?7)",
            params![
                &license.id,
                &license.user_id,
                &license.script_id,
                &license.license_key,
                license.price_paid,
                license.status.as_ref(),
                now
            ],
        )?;
        licenses.push(license);
    }

    tx.execute("DELETE FROM cart_items WHERE user_id = ?1", params![user_id])?;
    tx.commit()?;

    Ok(CheckoutReceipt {
        licenses,
        items,
        total,
        new_balance,
    })
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointAdjustment {
    pub previous: i64,
    pub current: i64,
}

/// Overwrite a user's balance. Administrative override, recorded as a ledger
/// entry with the difference.
pub fn set_points(
    conn: &mut Connection,
    user_id: &str,
    points: i64,
    actor_id: &str,
    now: i64,
) -> Result<PointAdjustment> {
    if points < 0 {
        return Err(AppError::BadRequest("Points cannot be negative".into()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let previous: i64 = tx
        .query_row(
            "SELECT points FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    tx.execute(
        "UPDATE users SET points = ?1, updated_at = ?2 WHERE id = ?3",
        params![points, now, user_id],
    )?;
    tx.execute(
        "INSERT INTO point_entries (id, user_id, delta, balance_after, reason, intent_id, actor_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7)",
        params![
            gen_id(),
            user_id,
            points - previous,
            points,
            PointReason::AdminAdjustment.as_ref(),
            actor_id,
            now
        ],
    )?;
    tx.commit()?;

    Ok(PointAdjustment {
        previous,
        current: points,
    })
}
