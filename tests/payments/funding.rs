use scriptshop::error::AppError;
use scriptshop::payments::funding::{self, IntentRequest};

use crate::common::*;

#[test]
fn test_qr_intent_is_salted_and_expires() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "1001");
    let now = now();

    let intent = create_test_qr_intent(&conn, &user.id, "100", now);

    assert_eq!(intent.status, FundingStatus::Pending);
    assert_eq!(intent.method, FundingMethod::Qr);
    assert_eq!(intent.requested_amount, 10_000);
    assert!(intent.amount > 10_000 && intent.amount < 10_100);
    assert_eq!(intent.points_to_credit, 100);
    assert_eq!(intent.expires_at, Some(now + 15 * 60));
    assert_eq!(intent.reference.len(), 16);
    assert!(intent.resolved_at.is_none());
}

#[test]
fn test_points_ignore_fractional_baht() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "1001");

    let intent = create_test_qr_intent(&conn, &user.id, "99.99", now());

    assert_eq!(intent.requested_amount, 9_999);
    assert_eq!(intent.points_to_credit, 99);
}

#[test]
fn test_salt_avoids_pending_amounts() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "1001");
    let now = now();

    let amounts: Vec<i64> = (0..5)
        .map(|_| create_test_qr_intent(&conn, &user.id, "50", now).amount)
        .collect();

    let mut unique = amounts.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), amounts.len(), "salted amounts collided: {:?}", amounts);
}

#[test]
fn test_unsalted_intent_charges_requested_amount() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "1001");
    let mut settings = test_payment_settings();
    settings.salt_enabled = false;

    let intent = funding::create_intent(
        &conn,
        &settings,
        &EventBus::default(),
        &IntentRequest {
            user_id: &user.id,
            amount: dec("75.50"),
            method: FundingMethod::Qr,
            evidence_url: None,
        },
        now(),
    )
    .unwrap();

    assert_eq!(intent.amount, 7_550);
    assert_eq!(intent.amount, intent.requested_amount);
}

#[test]
fn test_invalid_amounts_are_rejected() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "1001");

    for amount in ["0", "-10", "0.50", "100000.01", "10.005"] {
        let result = funding::create_intent(
            &conn,
            &test_payment_settings(),
            &EventBus::default(),
            &IntentRequest {
                user_id: &user.id,
                amount: dec(amount),
                method: FundingMethod::Qr,
                evidence_url: None,
            },
            now(),
        );
        assert!(
            matches!(result, Err(AppError::InvalidAmount(_))),
            "amount {} should be rejected",
            amount
        );
    }
}

#[test]
fn test_slip_intent_requires_evidence() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "1001");

    let result = funding::create_intent(
        &conn,
        &test_payment_settings(),
        &EventBus::default(),
        &IntentRequest {
            user_id: &user.id,
            amount: dec("200"),
            method: FundingMethod::Slip,
            evidence_url: None,
        },
        now(),
    );
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let intent = create_test_slip_intent(&conn, &user.id, "200");
    assert_eq!(intent.amount, 20_000);
    assert!(intent.expires_at.is_none());
    assert_eq!(intent.evidence_url.as_deref(), Some("/uploads/slips/slip-test.png"));
}

#[test]
fn test_creation_publishes_event() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "1001");
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let intent = funding::create_intent(
        &conn,
        &test_payment_settings(),
        &events,
        &IntentRequest {
            user_id: &user.id,
            amount: dec("10"),
            method: FundingMethod::Qr,
            evidence_url: None,
        },
        now(),
    )
    .unwrap();

    match rx.try_recv().unwrap() {
        DomainEvent::IntentCreated { intent_id, reference, .. } => {
            assert_eq!(intent_id, intent.id);
            assert_eq!(reference, intent.reference);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_sweep_expires_only_stale_qr_intents() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "1001");
    let now = now();

    let stale = create_test_qr_intent(&conn, &user.id, "10", now - 20 * 60);
    let fresh = create_test_qr_intent(&conn, &user.id, "10", now);
    let slip = create_test_slip_intent(&conn, &user.id, "10");

    let events = EventBus::default();
    let mut rx = events.subscribe();
    let expired = funding::expire_stale_intents(&conn, &events, now).unwrap();
    assert_eq!(expired, 1);

    let status = |id: &str| queries::get_funding_intent_by_id(&conn, id).unwrap().unwrap().status;
    assert_eq!(status(&stale.id), FundingStatus::Expired);
    assert_eq!(status(&fresh.id), FundingStatus::Pending);
    assert_eq!(status(&slip.id), FundingStatus::Pending);

    assert!(matches!(rx.try_recv().unwrap(), DomainEvent::IntentExpired { .. }));

    // A second sweep finds nothing left to do.
    assert_eq!(funding::expire_stale_intents(&conn, &events, now).unwrap(), 0);
}

#[test]
fn test_deadline_is_exclusive() {
    let conn = setup_test_db();
    let user = create_test_user(&conn, "1001");
    let created = now() - 15 * 60;
    let intent = create_test_qr_intent(&conn, &user.id, "10", created);
    let deadline = intent.expires_at.unwrap();

    let events = EventBus::default();
    let at_deadline = funding::refresh_intent(&conn, &events, intent.clone(), deadline).unwrap();
    assert_eq!(at_deadline.status, FundingStatus::Pending);

    let after = funding::refresh_intent(&conn, &events, intent, deadline + 1).unwrap();
    assert_eq!(after.status, FundingStatus::Expired);
    assert_eq!(after.resolved_at, Some(deadline + 1));
}
