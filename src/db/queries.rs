use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::Result;
use crate::id::EntityType;
use crate::models::*;
use crate::payments::PaymentStatusSnapshot;

use super::from_row::{query_all, query_one, ORDER_COLS, PAYMENT_RECORD_COLS, TICKET_COLS};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Orders ============

/// Create a pending order. The total is computed here from the captured
/// unit price; client-supplied totals are never trusted.
pub fn create_order(
    conn: &Connection,
    input: &CreateOrder,
    unit_price: i64,
    currency: &str,
) -> Result<Order> {
    let id = EntityType::Order.gen_id();
    let created_at = now();
    let total = input.quantity * unit_price;

    conn.execute(
        "INSERT INTO orders (id, buyer_name, buyer_email, buyer_phone, buyer_tax_id,
                             quantity, unit_price, total, currency, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10)",
        params![
            &id,
            &input.buyer_name,
            &input.buyer_email,
            &input.buyer_phone,
            &input.buyer_tax_id,
            input.quantity,
            unit_price,
            total,
            currency,
            created_at
        ],
    )?;

    Ok(Order {
        id,
        buyer_name: input.buyer_name.clone(),
        buyer_email: input.buyer_email.clone(),
        buyer_phone: input.buyer_phone.clone(),
        buyer_tax_id: input.buyer_tax_id.clone(),
        quantity: input.quantity,
        unit_price,
        total,
        currency: currency.to_string(),
        status: OrderStatus::Pending,
        created_at,
        paid_at: None,
    })
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

/// Atomically move a pending order into a terminal state.
///
/// The `status = 'pending'` guard is the terminal-immutability enforcement
/// at the storage layer: concurrent settlers race on this row-scoped
/// compare-and-swap and exactly one wins. Returns whether this call
/// performed the transition.
pub fn try_settle_order(
    conn: &Connection,
    order_id: &str,
    new_status: OrderStatus,
    paid_at: Option<i64>,
) -> Result<bool> {
    debug_assert!(new_status.is_terminal());
    let affected = conn.execute(
        "UPDATE orders SET status = ?1, paid_at = ?2 WHERE id = ?3 AND status = 'pending'",
        params![new_status.as_str(), paid_at, order_id],
    )?;
    Ok(affected > 0)
}

// ============ Payment Records ============

/// Mark all active payment records of an order as superseded.
/// Called inside the checkout-retry transaction before inserting the
/// replacement record.
pub fn supersede_active_payment_records(conn: &Connection, order_id: &str) -> Result<usize> {
    let affected = conn.execute(
        "UPDATE payment_records SET superseded = 1, updated_at = ?1
         WHERE order_id = ?2 AND superseded = 0",
        params![now(), order_id],
    )?;
    Ok(affected)
}

pub fn create_payment_record(
    conn: &Connection,
    input: &CreatePaymentRecord,
) -> Result<PaymentRecord> {
    let id = EntityType::PaymentRecord.gen_id();
    let created_at = now();

    conn.execute(
        "INSERT INTO payment_records (id, order_id, gateway_payment_id, notification_token,
                                      expires_at, superseded, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
        params![
            &id,
            &input.order_id,
            &input.gateway_payment_id,
            &input.notification_token,
            input.expires_at,
            created_at
        ],
    )?;

    Ok(PaymentRecord {
        id,
        order_id: input.order_id.clone(),
        gateway_payment_id: input.gateway_payment_id.clone(),
        notification_token: input.notification_token.clone(),
        gateway_status: None,
        status_detail: None,
        payer_email: None,
        payer_name: None,
        raw_payload: None,
        expires_at: input.expires_at,
        superseded: false,
        created_at,
        updated_at: created_at,
    })
}

pub fn get_payment_record_by_token(
    conn: &Connection,
    notification_token: &str,
) -> Result<Option<PaymentRecord>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_records WHERE notification_token = ?1",
            PAYMENT_RECORD_COLS
        ),
        &[&notification_token],
    )
}

pub fn get_active_payment_record(
    conn: &Connection,
    order_id: &str,
) -> Result<Option<PaymentRecord>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_records WHERE order_id = ?1 AND superseded = 0",
            PAYMENT_RECORD_COLS
        ),
        &[&order_id],
    )
}

/// Record the latest authoritative gateway snapshot on a payment record.
pub fn update_payment_record_snapshot(
    conn: &Connection,
    record_id: &str,
    snapshot: &PaymentStatusSnapshot,
) -> Result<()> {
    conn.execute(
        "UPDATE payment_records
         SET gateway_status = ?1, status_detail = ?2, payer_email = ?3, payer_name = ?4,
             raw_payload = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            &snapshot.status,
            &snapshot.status_detail,
            &snapshot.payer_email,
            &snapshot.payer_name,
            &snapshot.raw_payload,
            now(),
            record_id
        ],
    )?;
    Ok(())
}

/// Active payment records whose gateway expiry has passed while the order
/// is still pending. Input to the reconciliation sweep.
pub fn list_overdue_payment_records(
    conn: &Connection,
    cutoff: i64,
    limit: i64,
) -> Result<Vec<PaymentRecord>> {
    let cols: Vec<String> = PAYMENT_RECORD_COLS
        .split(", ")
        .map(|c| format!("p.{}", c))
        .collect();
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_records p
             JOIN orders o ON o.id = p.order_id
             WHERE p.superseded = 0 AND p.expires_at < ?1 AND o.status = 'pending'
             ORDER BY p.expires_at ASC
             LIMIT ?2",
            cols.join(", ")
        ),
        &[&cutoff, &limit],
    )
}

// ============ Webhook Idempotency Marks ============

/// How long an uncompleted claim stays exclusive before a retry may reclaim
/// it. Must comfortably exceed the gateway request timeout.
pub const CLAIM_STALE_SECS: i64 = 120;

/// Outcome of attempting to claim a notification token for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookClaim {
    /// This caller owns the token and must complete or release the claim.
    Proceed,
    /// A previous delivery already processed this token to completion.
    AlreadyDone,
    /// Another delivery holds a live claim; acknowledge and stand down.
    InFlight,
}

/// Atomically claim a notification token.
///
/// Every step is a single conditional statement, never a check-then-act
/// pair, so concurrent deliveries of the same token cannot both win:
/// the INSERT claims unseen tokens, and the conditional UPDATE reclaims
/// only claims that went stale without completing.
pub fn try_claim_webhook_event(conn: &Connection, token: &str) -> Result<WebhookClaim> {
    let now = now();

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (notification_token, claimed_at) VALUES (?1, ?2)",
        params![token, now],
    )?;
    if inserted > 0 {
        return Ok(WebhookClaim::Proceed);
    }

    let completed_at: Option<Option<i64>> = conn
        .query_row(
            "SELECT completed_at FROM webhook_events WHERE notification_token = ?1",
            params![token],
            |row| row.get(0),
        )
        .optional()?;

    match completed_at {
        Some(Some(_)) => Ok(WebhookClaim::AlreadyDone),
        Some(None) => {
            let reclaimed = conn.execute(
                "UPDATE webhook_events SET claimed_at = ?1
                 WHERE notification_token = ?2 AND completed_at IS NULL AND claimed_at <= ?3",
                params![now, token, now - CLAIM_STALE_SECS],
            )?;
            if reclaimed > 0 {
                Ok(WebhookClaim::Proceed)
            } else {
                Ok(WebhookClaim::InFlight)
            }
        }
        // Row released between our two statements; the releasing delivery
        // is about to be retried by the gateway anyway.
        None => Ok(WebhookClaim::InFlight),
    }
}

/// Mark a claimed token as processed to completion.
pub fn complete_webhook_event(conn: &Connection, token: &str) -> Result<()> {
    conn.execute(
        "UPDATE webhook_events SET completed_at = ?1 WHERE notification_token = ?2",
        params![now(), token],
    )?;
    Ok(())
}

/// Release an uncompleted claim after a retryable failure so the gateway's
/// next delivery can proceed immediately instead of waiting out staleness.
pub fn release_webhook_event(conn: &Connection, token: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM webhook_events WHERE notification_token = ?1 AND completed_at IS NULL",
        params![token],
    )?;
    Ok(())
}

/// Purge idempotency marks beyond the retention period. The gateway stops
/// retrying long before this cutoff.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE COALESCE(completed_at, claimed_at) < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Tickets ============

fn gen_ticket_code() -> String {
    // 10 hex chars of a v4 UUID, grouped for readability on printed stubs.
    let hex = Uuid::new_v4().as_simple().to_string();
    format!("MC-{}-{}", &hex[..5].to_uppercase(), &hex[5..10].to_uppercase())
}

/// Issue the tickets owed by a paid order.
///
/// Idempotent: the UNIQUE(order_id, seq) pair makes a re-run (webhook
/// defense-in-depth, sweep repair after a crash) insert nothing new.
/// Returns the full set of tickets for the order.
pub fn issue_tickets(conn: &Connection, order: &Order) -> Result<Vec<Ticket>> {
    let issued_at = now();
    for seq in 1..=order.units_owed() {
        conn.execute(
            "INSERT OR IGNORE INTO tickets (id, order_id, seq, code, issued_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                EntityType::Ticket.gen_id(),
                &order.id,
                seq,
                gen_ticket_code(),
                issued_at
            ],
        )?;
    }
    get_tickets_for_order(conn, &order.id)
}

/// Paid orders holding fewer tickets than they are owed. Input to the
/// sweep's repair pass after a crashed side-effect phase.
pub fn list_underissued_paid_orders(conn: &Connection, limit: i64) -> Result<Vec<Order>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM orders o
             WHERE o.status = 'paid'
               AND (SELECT COUNT(*) FROM tickets t WHERE t.order_id = o.id) < o.quantity
             ORDER BY o.paid_at ASC
             LIMIT ?1",
            ORDER_COLS
                .split(", ")
                .map(|c| format!("o.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        &[&limit],
    )
}

pub fn get_tickets_for_order(conn: &Connection, order_id: &str) -> Result<Vec<Ticket>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM tickets WHERE order_id = ?1 ORDER BY seq ASC",
            TICKET_COLS
        ),
        &[&order_id],
    )
}

pub fn count_tickets_for_order(conn: &Connection, order_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM tickets WHERE order_id = ?1",
        params![order_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
