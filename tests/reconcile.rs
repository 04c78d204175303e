//! Settlement core tests: idempotency claims, terminal immutability,
//! atomic snapshot application, and ticket issuance math.

mod common;
use common::*;

use motorcards::db::queries::{
    complete_webhook_event, release_webhook_event, try_claim_webhook_event, try_settle_order,
    WebhookClaim, CLAIM_STALE_SECS,
};
use motorcards::handlers::webhooks::common::{apply_snapshot_atomic, SettleOutcome};
use rusqlite::params;

// ============ Idempotency Guard ============

#[test]
fn test_first_claim_proceeds_duplicate_stands_down() {
    let conn = setup_test_db();
    let token = gen_notification_token();

    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::Proceed);
    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::InFlight);
}

#[test]
fn test_completed_claim_reports_already_done() {
    let conn = setup_test_db();
    let token = gen_notification_token();

    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::Proceed);
    complete_webhook_event(&conn, &token).unwrap();
    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::AlreadyDone);
    // Stays done no matter how often the gateway redelivers
    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::AlreadyDone);
}

#[test]
fn test_released_claim_is_immediately_reclaimable() {
    let conn = setup_test_db();
    let token = gen_notification_token();

    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::Proceed);
    release_webhook_event(&conn, &token).unwrap();
    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::Proceed);
}

#[test]
fn test_stale_claim_is_reclaimable() {
    let conn = setup_test_db();
    let token = gen_notification_token();

    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::Proceed);

    // Age the claim past the staleness window, as if the holder crashed
    let stale = chrono::Utc::now().timestamp() - CLAIM_STALE_SECS - 5;
    conn.execute(
        "UPDATE webhook_events SET claimed_at = ?1 WHERE notification_token = ?2",
        params![stale, &token],
    )
    .unwrap();

    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::Proceed);
    // The reclaim refreshed claimed_at, so a third delivery stands down again
    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::InFlight);
}

#[test]
fn test_release_does_not_erase_completed_marks() {
    let conn = setup_test_db();
    let token = gen_notification_token();

    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::Proceed);
    complete_webhook_event(&conn, &token).unwrap();
    release_webhook_event(&conn, &token).unwrap();
    assert_eq!(try_claim_webhook_event(&conn, &token).unwrap(), WebhookClaim::AlreadyDone);
}

// ============ Order settlement CAS ============

#[test]
fn test_settle_cas_has_exactly_one_winner() {
    let conn = setup_test_db();
    let order = create_test_order(&conn, 4);

    assert!(try_settle_order(&conn, &order.id, OrderStatus::Paid, Some(123)).unwrap());
    // Second settle attempt loses: the order is no longer pending
    assert!(!try_settle_order(&conn, &order.id, OrderStatus::Paid, Some(456)).unwrap());
    assert!(!try_settle_order(&conn, &order.id, OrderStatus::Expired, None).unwrap());

    let reloaded = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(reloaded.status, OrderStatus::Paid);
    assert_eq!(reloaded.paid_at, Some(123));
}

// ============ Atomic snapshot application ============

#[test]
fn test_verified_snapshot_settles_pending_order() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 4);
    let record = create_test_payment_record(&conn, &order.id);

    let outcome = apply_snapshot_atomic(&mut conn, &record, &snapshot("done")).unwrap();
    match outcome {
        SettleOutcome::Transitioned { new_status, ref order, .. } => {
            assert_eq!(new_status, OrderStatus::Paid);
            assert_eq!(order.paid_at, Some(1_700_000_000));
        }
        other => panic!("Expected Transitioned, got {:?}", other),
    }

    let reloaded = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(reloaded.status, OrderStatus::Paid);
    assert_eq!(reloaded.paid_at, Some(1_700_000_000));

    // The payment record carries the authoritative snapshot
    let record = queries::get_payment_record_by_token(&conn, &record.notification_token)
        .unwrap()
        .unwrap();
    assert_eq!(record.gateway_status.as_deref(), Some("done"));
    assert!(record.raw_payload.is_some());
}

#[test]
fn test_pending_snapshot_transitions_nothing() {
    // The untrusted-body property at the settlement layer: whatever the
    // webhook body claimed, a gateway still reporting "pending" must leave
    // the order untouched.
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 4);
    let record = create_test_payment_record(&conn, &order.id);

    let outcome = apply_snapshot_atomic(&mut conn, &record, &snapshot("pending")).unwrap();
    assert!(matches!(outcome, SettleOutcome::StillPending));

    let reloaded = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(reloaded.status, OrderStatus::Pending);
    assert_eq!(reloaded.paid_at, None);
}

#[test]
fn test_unknown_gateway_status_transitions_nothing() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 2);
    let record = create_test_payment_record(&conn, &order.id);

    let outcome = apply_snapshot_atomic(&mut conn, &record, &snapshot("in_review")).unwrap();
    assert!(matches!(outcome, SettleOutcome::StillPending));
    let reloaded = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(reloaded.status, OrderStatus::Pending);
}

#[test]
fn test_expired_snapshot_settles_without_paid_at() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 3);
    let record = create_test_payment_record(&conn, &order.id);

    let outcome = apply_snapshot_atomic(&mut conn, &record, &snapshot("expired")).unwrap();
    assert!(matches!(
        outcome,
        SettleOutcome::Transitioned { new_status: OrderStatus::Expired, .. }
    ));

    let reloaded = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(reloaded.status, OrderStatus::Expired);
    assert_eq!(reloaded.paid_at, None);
}

#[test]
fn test_terminal_order_is_immutable() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 4);
    let record = create_test_payment_record(&conn, &order.id);

    apply_snapshot_atomic(&mut conn, &record, &snapshot("done")).unwrap();

    // No later snapshot - not even a conflicting terminal one - moves it
    for status in ["done", "cancelled", "expired", "pending"] {
        let outcome = apply_snapshot_atomic(&mut conn, &record, &snapshot(status)).unwrap();
        assert!(
            matches!(outcome, SettleOutcome::AlreadyTerminal),
            "status {} should be a no-op on a paid order",
            status
        );
        let reloaded = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
        assert_eq!(reloaded.status, OrderStatus::Paid);
        assert_eq!(reloaded.paid_at, Some(1_700_000_000));
    }
}

#[test]
fn test_superseded_record_cannot_settle_order() {
    let mut conn = setup_test_db();
    let order = create_test_order(&conn, 4);
    let old_record = create_test_payment_record(&conn, &order.id);

    // Buyer retried checkout: old record superseded, new one active
    queries::supersede_active_payment_records(&conn, &order.id).unwrap();
    let new_record = create_test_payment_record(&conn, &order.id);

    let old_record = queries::get_payment_record_by_token(&conn, &old_record.notification_token)
        .unwrap()
        .unwrap();
    assert!(old_record.superseded);

    // Webhook for the superseded attempt: bookkeeping only
    let outcome = apply_snapshot_atomic(&mut conn, &old_record, &snapshot("done")).unwrap();
    assert!(matches!(outcome, SettleOutcome::SupersededRecord));
    let reloaded = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(reloaded.status, OrderStatus::Pending);

    // Only the active record settles the order
    let outcome = apply_snapshot_atomic(&mut conn, &new_record, &snapshot("done")).unwrap();
    assert!(matches!(outcome, SettleOutcome::Transitioned { .. }));
    let reloaded = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(reloaded.status, OrderStatus::Paid);
}

// ============ Ticket issuance ============

#[test]
fn test_issuance_count_fixed_at_creation_time() {
    let conn = setup_test_db();
    // quantity=4, unit_price=2500, total=10000
    let order = create_test_order(&conn, 4);
    assert_eq!(order.total, 10_000);
    assert_eq!(order.units_owed(), 4);

    let tickets = queries::issue_tickets(&conn, &order).unwrap();
    assert_eq!(tickets.len(), 4);
    let seqs: Vec<i64> = tickets.iter().map(|t| t.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
}

#[test]
fn test_issuance_is_idempotent() {
    let conn = setup_test_db();
    let order = create_test_order(&conn, 4);

    let first = queries::issue_tickets(&conn, &order).unwrap();
    let second = queries::issue_tickets(&conn, &order).unwrap();

    assert_eq!(first.len(), 4);
    assert_eq!(second.len(), 4);
    assert_eq!(queries::count_tickets_for_order(&conn, &order.id).unwrap(), 4);

    // Re-issuance kept the original codes
    let first_codes: Vec<&str> = first.iter().map(|t| t.code.as_str()).collect();
    let second_codes: Vec<&str> = second.iter().map(|t| t.code.as_str()).collect();
    assert_eq!(first_codes, second_codes);
}

#[test]
fn test_ticket_codes_are_unique_across_orders() {
    let conn = setup_test_db();
    let a = create_test_order(&conn, 5);
    let b = create_test_order(&conn, 5);

    let mut codes: Vec<String> = queries::issue_tickets(&conn, &a)
        .unwrap()
        .into_iter()
        .chain(queries::issue_tickets(&conn, &b).unwrap())
        .map(|t| t.code)
        .collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 10);
}
