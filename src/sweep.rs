//! Periodic reconciliation sweep.
//!
//! Webhooks can be lost: the gateway's retries give up eventually, and a
//! crash between claim and settle leaves an order pending past its payment
//! expiry. The sweep re-checks those orders against the gateway on an
//! interval, through the exact same claim/settle path the webhook handler
//! uses - never a parallel one - so the idempotency discipline holds.

use std::time::Duration;

use crate::db::{queries, AppState};
use crate::error::AppError;
use crate::handlers::webhooks::common::{reconcile_payment_record, ReconcileOutcome};

/// Max overdue records re-checked per pass; the rest wait for the next tick.
const SWEEP_BATCH_SIZE: i64 = 50;

/// Run one sweep pass. Returns the number of orders settled.
pub async fn run_sweep_pass(state: &AppState) -> crate::error::Result<usize> {
    let overdue = {
        let conn = state.db.get()?;
        queries::list_overdue_payment_records(
            &conn,
            chrono::Utc::now().timestamp(),
            SWEEP_BATCH_SIZE,
        )?
    };

    repair_ticket_issuance(state)?;

    if overdue.is_empty() {
        return Ok(0);
    }

    tracing::info!(count = overdue.len(), "Sweep: re-checking overdue pending orders");

    let mut settled = 0;
    for record in &overdue {
        match reconcile_payment_record(state, record).await {
            Ok(ReconcileOutcome::Settled(status)) => {
                settled += 1;
                tracing::info!(
                    order_id = %record.order_id,
                    status = %status,
                    "Sweep settled order"
                );
            }
            Ok(ReconcileOutcome::StillPending) => {
                tracing::debug!(
                    order_id = %record.order_id,
                    "Sweep: gateway still reports payment unsettled"
                );
            }
            Ok(ReconcileOutcome::NoOp) => {}
            Err(AppError::GatewayUnavailable(_)) => {
                // The gateway is down; the rest of the batch would fail the
                // same way. Claims are already released, try next tick.
                tracing::warn!("Sweep aborted: gateway unavailable");
                break;
            }
            Err(e) => {
                tracing::error!(
                    order_id = %record.order_id,
                    error = %e,
                    "Sweep: reconciliation failed"
                );
            }
        }
    }

    Ok(settled)
}

/// Re-run issuance for paid orders whose tickets never fully materialized
/// (a crash between settlement and issuance). Issuance is idempotent, so
/// this can only top an order up to what it is owed, never beyond.
fn repair_ticket_issuance(state: &AppState) -> crate::error::Result<()> {
    let conn = state.db.get()?;
    let underissued = queries::list_underissued_paid_orders(&conn, SWEEP_BATCH_SIZE)?;

    for order in &underissued {
        match queries::issue_tickets(&conn, order) {
            Ok(tickets) => {
                tracing::warn!(
                    order_id = %order.id,
                    count = tickets.len(),
                    "Sweep repaired incomplete ticket issuance"
                );
            }
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    error = %e,
                    "Sweep: ticket issuance repair failed"
                );
            }
        }
    }
    Ok(())
}

/// Spawn the background sweep task. An interval of 0 disables it.
pub fn spawn_sweep_task(state: AppState, interval_secs: u64, retention_days: i64) {
    if interval_secs == 0 {
        tracing::info!("Reconciliation sweep disabled");
        return;
    }

    tokio::spawn(async move {
        let interval = Duration::from_secs(interval_secs);

        loop {
            tokio::time::sleep(interval).await;

            if let Err(e) = run_sweep_pass(&state).await {
                tracing::warn!("Sweep pass failed: {}", e);
            }

            match state.db.get() {
                Ok(conn) => match queries::purge_old_webhook_events(&conn, retention_days) {
                    Ok(count) if count > 0 => {
                        tracing::debug!("Purged {} old idempotency marks", count);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Failed to purge idempotency marks: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to get db connection for purge: {}", e);
                }
            }
        }
    });

    tracing::info!(
        "Reconciliation sweep started (runs every {} seconds)",
        interval_secs
    );
}
