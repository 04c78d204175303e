use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{msg, AppError, OptionExt, Result};
use crate::extractors::Json;
use crate::id::gen_notification_token;
use crate::models::{CreatePaymentRecord, Order, OrderStatus, PaymentRecord};
use crate::payments::CreatePaymentRequest;

/// Upper bound on tickets per order; keeps a single checkout inside the
/// gateway's per-payment amount limits.
const MAX_QUANTITY: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_phone: String,
    #[serde(default)]
    pub buyer_tax_id: Option<String>,
    pub quantity: i64,
    /// Optional client-computed total, asserted against the server-side
    /// computation. Never used as the charged amount.
    #[serde(default)]
    pub total: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: String,
    /// Gateway checkout page to send the buyer to.
    pub redirect_url: String,
    pub quantity: i64,
    pub total: i64,
    pub currency: String,
}

fn validate_request(req: &CheckoutRequest, unit_price: i64) -> Result<()> {
    if req.quantity < 1 || req.quantity > MAX_QUANTITY {
        return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
    }
    if req.buyer_name.trim().is_empty() || req.buyer_phone.trim().is_empty() {
        return Err(AppError::BadRequest("Buyer name and phone are required".into()));
    }
    if !req.buyer_email.contains('@') {
        return Err(AppError::BadRequest("Invalid buyer email".into()));
    }
    // The charged amount is always quantity * unit_price as computed here;
    // a client-sent total is only cross-checked so a stale price in the
    // storefront fails loudly instead of charging a surprise amount.
    if let Some(total) = req.total {
        if total != req.quantity * unit_price {
            return Err(AppError::BadRequest(msg::TOTAL_MISMATCH.into()));
        }
    }
    Ok(())
}

/// Create a gateway payment for an order and record the attempt.
///
/// Any previously active payment record for the order is superseded in the
/// same transaction that records the new attempt, so at most one record can
/// ever settle the order.
async fn start_payment(state: &AppState, order: &Order) -> Result<(PaymentRecord, String)> {
    let notification_token = gen_notification_token();
    let expires_at =
        chrono::Utc::now().timestamp() + state.payment_expiry_minutes * 60;

    let subject = format!(
        "MotorCards raffle: {} ticket(s), order {}",
        order.quantity, order.id
    );
    let notify_url = format!("{}/webhooks/payment", state.base_url);
    let return_url = format!("{}/payments/return?order={}", state.base_url, order.id);
    let cancel_url = format!(
        "{}/payments/return?order={}&from=cancel",
        state.base_url, order.id
    );

    let created = state
        .gateway
        .create_payment(&CreatePaymentRequest {
            order_id: &order.id,
            subject: &subject,
            amount: order.total,
            currency: &order.currency,
            buyer_email: &order.buyer_email,
            buyer_name: &order.buyer_name,
            notification_token: &notification_token,
            notify_url: &notify_url,
            return_url: &return_url,
            cancel_url: &cancel_url,
            expires_at,
        })
        .await?;

    if created.notification_token != notification_token {
        // The gateway must echo our token verbatim; a mismatch means the
        // webhook correlation would silently break.
        return Err(AppError::Internal(
            "Gateway did not echo the notification token".into(),
        ));
    }

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    queries::supersede_active_payment_records(&tx, &order.id)?;
    let record = queries::create_payment_record(
        &tx,
        &CreatePaymentRecord {
            order_id: order.id.clone(),
            gateway_payment_id: created.gateway_payment_id,
            notification_token,
            expires_at,
        },
    )?;
    tx.commit()?;

    Ok((record, created.redirect_url))
}

/// POST /orders - purchase intent.
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    validate_request(&request, state.unit_price)?;

    let order = {
        let conn = state.db.get()?;
        queries::create_order(
            &conn,
            &crate::models::CreateOrder {
                buyer_name: request.buyer_name.trim().to_string(),
                buyer_email: request.buyer_email.trim().to_string(),
                buyer_phone: request.buyer_phone.trim().to_string(),
                buyer_tax_id: request.buyer_tax_id.clone(),
                quantity: request.quantity,
            },
            state.unit_price,
            &state.currency,
        )?
    };

    let (_, redirect_url) = start_payment(&state, &order).await?;

    tracing::info!(
        order_id = %order.id,
        quantity = order.quantity,
        total = order.total,
        "Order created, buyer redirected to gateway"
    );

    Ok(Json(CheckoutResponse {
        order_id: order.id,
        redirect_url,
        quantity: order.quantity,
        total: order.total,
        currency: order.currency,
    }))
}

/// POST /orders/{id}/retry - start a fresh payment attempt for a
/// still-pending order (e.g. the buyer abandoned the gateway page).
pub async fn retry_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<CheckoutResponse>> {
    let order = {
        let conn = state.db.get()?;
        queries::get_order_by_id(&conn, &order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?
    };

    if order.status != OrderStatus::Pending {
        return Err(AppError::Conflict(msg::ORDER_NOT_PENDING.into()));
    }

    let (_, redirect_url) = start_payment(&state, &order).await?;

    tracing::info!(order_id = %order.id, "Payment retry started, previous attempt superseded");

    Ok(Json(CheckoutResponse {
        order_id: order.id,
        redirect_url,
        quantity: order.quantity,
        total: order.total,
        currency: order.currency,
    }))
}
