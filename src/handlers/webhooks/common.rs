//! Reconciliation core shared by the webhook handler and the periodic sweep.
//!
//! A payment settles through exactly one path: claim the notification token,
//! re-fetch the authoritative status from the gateway, apply it to the order
//! inside a single transaction, then fire side effects. The webhook endpoint
//! and the sweep both call into here; there is no second settlement path.

use axum::http::StatusCode;
use rusqlite::Connection;

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::models::{Order, OrderStatus, PaymentRecord};
use crate::notify::{spawn_notification, BuyerNotification, NotificationKind};
use crate::payments::{GatewayError, PaymentStatus, PaymentStatusSnapshot};

/// Result type for webhook operations.
pub type WebhookResult = (StatusCode, &'static str);

/// Side effect owed after a terminal transition. Fired at most once per
/// order, outside the settlement transaction, best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Issue the order's tickets and send the confirmation.
    IssueAndConfirm,
    /// Tell the buyer the payment window lapsed.
    NotifyExpired,
    /// Tell the buyer the payment was cancelled.
    NotifyCancelled,
}

/// Plan the order transition for an authoritative gateway status.
///
/// Pure function; the whole state machine is here. Terminal states accept
/// nothing (re-delivery of an already-settled payment is a no-op), and a
/// gateway status outside the settled vocabulary transitions nothing.
pub fn plan_transition(
    current: OrderStatus,
    mapped: PaymentStatus,
) -> Option<(OrderStatus, SideEffect)> {
    if current.is_terminal() {
        return None;
    }
    match mapped {
        PaymentStatus::Verified => Some((OrderStatus::Paid, SideEffect::IssueAndConfirm)),
        PaymentStatus::Expired => Some((OrderStatus::Expired, SideEffect::NotifyExpired)),
        PaymentStatus::Cancelled => Some((OrderStatus::Cancelled, SideEffect::NotifyCancelled)),
        PaymentStatus::Pending => None,
    }
}

/// What applying a gateway snapshot to the local rows actually did.
#[derive(Debug)]
pub enum SettleOutcome {
    /// This call moved the order into a terminal state and owes the side
    /// effect. Carries the order as read inside the settlement transaction.
    Transitioned {
        order: Order,
        new_status: OrderStatus,
        effect: SideEffect,
    },
    /// The order was already terminal (or lost the settlement race).
    AlreadyTerminal,
    /// The gateway still reports an unsettled status.
    StillPending,
    /// The record was superseded by a newer payment attempt; its snapshot
    /// was recorded but it can never transition the order.
    SupersededRecord,
}

/// Apply an authoritative gateway snapshot to the payment record and its
/// order in one transaction.
///
/// The snapshot update and the order transition commit together or not at
/// all. The transition itself is a compare-and-swap on `status = 'pending'`,
/// scoped to this order's row, so concurrent settlers of unrelated orders
/// never contend and concurrent settlers of the same order produce exactly
/// one winner.
pub fn apply_snapshot_atomic(
    conn: &mut Connection,
    record: &PaymentRecord,
    snapshot: &PaymentStatusSnapshot,
) -> Result<SettleOutcome> {
    let mapped = PaymentStatus::from_gateway(&snapshot.status);

    let tx = conn.transaction()?;

    queries::update_payment_record_snapshot(&tx, &record.id, snapshot)?;

    if record.superseded {
        tx.commit()?;
        tracing::info!(
            record_id = %record.id,
            order_id = %record.order_id,
            "Webhook for superseded payment record; bookkeeping only"
        );
        return Ok(SettleOutcome::SupersededRecord);
    }

    let order = match queries::get_order_by_id(&tx, &record.order_id)? {
        Some(o) => o,
        None => {
            // A payment record without its order is a persistence bug, not
            // a webhook problem; keep the snapshot and surface it loudly.
            tx.commit()?;
            tracing::error!(
                record_id = %record.id,
                order_id = %record.order_id,
                "Payment record references missing order"
            );
            return Ok(SettleOutcome::AlreadyTerminal);
        }
    };

    let Some((new_status, effect)) = plan_transition(order.status, mapped) else {
        tx.commit()?;
        return Ok(if order.status.is_terminal() {
            SettleOutcome::AlreadyTerminal
        } else {
            SettleOutcome::StillPending
        });
    };

    let paid_at = match new_status {
        OrderStatus::Paid => Some(snapshot.paid_at.unwrap_or_else(|| chrono::Utc::now().timestamp())),
        _ => None,
    };

    if !queries::try_settle_order(&tx, &order.id, new_status, paid_at)? {
        // Lost the race to a concurrent delivery. The snapshot update still
        // commits; the winner owns the side effects.
        tx.commit()?;
        return Ok(SettleOutcome::AlreadyTerminal);
    }

    tx.commit()?;

    Ok(SettleOutcome::Transitioned {
        order: Order {
            status: new_status,
            paid_at,
            ..order
        },
        new_status,
        effect,
    })
}

/// Fire the side effect owed by a fresh terminal transition.
///
/// Runs outside the settlement transaction. Failures are logged and never
/// propagated: the order is settled, and ticket issuance is idempotent so a
/// later sweep pass can repair a partial failure.
pub fn fire_side_effects(state: &AppState, order: &Order, effect: SideEffect) {
    let ticket_codes = match effect {
        SideEffect::IssueAndConfirm => match state.db.get() {
            Ok(conn) => match queries::issue_tickets(&conn, order) {
                Ok(tickets) => {
                    tracing::info!(
                        order_id = %order.id,
                        count = tickets.len(),
                        "Issued raffle tickets"
                    );
                    tickets.into_iter().map(|t| t.code).collect()
                }
                Err(e) => {
                    tracing::error!(
                        order_id = %order.id,
                        error = %e,
                        "Ticket issuance failed; will be repaired by sweep"
                    );
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "No connection for ticket issuance");
                Vec::new()
            }
        },
        _ => Vec::new(),
    };

    let kind = match effect {
        SideEffect::IssueAndConfirm => NotificationKind::PaymentConfirmed,
        SideEffect::NotifyExpired => NotificationKind::PaymentExpired,
        SideEffect::NotifyCancelled => NotificationKind::PaymentCancelled,
    };

    spawn_notification(
        state.notifier.clone(),
        BuyerNotification {
            kind,
            order_id: order.id.clone(),
            buyer_email: order.buyer_email.clone(),
            buyer_name: order.buyer_name.clone(),
            quantity: order.quantity,
            total: order.total,
            currency: order.currency.clone(),
            ticket_codes,
        },
    );
}

/// Outcome of a full reconciliation pass over one payment record.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// This pass settled the order.
    Settled(OrderStatus),
    /// Gateway still reports the payment as unsettled.
    StillPending,
    /// Nothing to do: duplicate delivery, in-flight claim, superseded
    /// record, or an order that was already terminal.
    NoOp,
}

/// Reconcile one payment record against the gateway.
///
/// Claim the token, fetch the canonical status, apply it, complete the
/// claim, fire side effects. On a retryable gateway failure the claim is
/// released, not completed, so the gateway's next retry (or the sweep) can
/// take another run at it.
pub async fn reconcile_payment_record(
    state: &AppState,
    record: &PaymentRecord,
) -> Result<ReconcileOutcome> {
    let conn = state.db.get()?;

    match queries::try_claim_webhook_event(&conn, &record.notification_token)? {
        queries::WebhookClaim::Proceed => {}
        queries::WebhookClaim::AlreadyDone => {
            tracing::debug!(
                token = %record.notification_token,
                "Duplicate delivery of an already-processed notification"
            );
            return Ok(ReconcileOutcome::NoOp);
        }
        queries::WebhookClaim::InFlight => {
            tracing::debug!(
                token = %record.notification_token,
                "Concurrent delivery already in flight"
            );
            return Ok(ReconcileOutcome::NoOp);
        }
    }
    drop(conn);

    // The stored gateway payment id drives the fetch; nothing from the
    // webhook body is trusted for business decisions.
    let snapshot = match state
        .gateway
        .fetch_payment_status(&record.gateway_payment_id)
        .await
    {
        Ok(s) => s,
        Err(e) => {
            let conn = state.db.get()?;
            queries::release_webhook_event(&conn, &record.notification_token)?;
            match &e {
                GatewayError::Unavailable(msg) => {
                    tracing::error!(
                        record_id = %record.id,
                        order_id = %record.order_id,
                        error = %msg,
                        "Gateway unavailable during reconciliation; claim released for retry"
                    );
                }
                GatewayError::Rejected(msg) => {
                    tracing::error!(
                        record_id = %record.id,
                        order_id = %record.order_id,
                        error = %msg,
                        "Gateway rejected status fetch; manual investigation required"
                    );
                }
            }
            return Err(e.into());
        }
    };

    let mut conn = state.db.get()?;
    let outcome = match apply_snapshot_atomic(&mut conn, record, &snapshot) {
        Ok(outcome) => outcome,
        Err(e) => {
            // Settlement failed before anything committed; free the claim so
            // the gateway's retry is not forced to wait out staleness.
            let _ = queries::release_webhook_event(&conn, &record.notification_token);
            return Err(e);
        }
    };

    match outcome {
        SettleOutcome::Transitioned {
            order,
            new_status,
            effect,
        } => {
            queries::complete_webhook_event(&conn, &record.notification_token)?;
            drop(conn);
            fire_side_effects(state, &order, effect);
            tracing::info!(
                order_id = %order.id,
                status = %new_status,
                "Order settled"
            );
            Ok(ReconcileOutcome::Settled(new_status))
        }
        SettleOutcome::AlreadyTerminal | SettleOutcome::SupersededRecord => {
            // The token's work is finished either way; seal it so future
            // deliveries short-circuit.
            queries::complete_webhook_event(&conn, &record.notification_token)?;
            Ok(ReconcileOutcome::NoOp)
        }
        SettleOutcome::StillPending => {
            // The same token will announce the eventual settlement; the
            // claim must not outlive this pass.
            queries::release_webhook_event(&conn, &record.notification_token)?;
            Ok(ReconcileOutcome::StillPending)
        }
    }
}
