use axum::extract::{Path, State};
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::{msg, OptionExt, Result};
use crate::extractors::Json;
use crate::models::OrderStatus;

#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub status: OrderStatus,
    /// Buyer-facing wording. A pending order reads as "processing" - from
    /// the buyer's side it is never an error, however long it lingers.
    pub display_status: &'static str,
    pub quantity: i64,
    pub total: i64,
    pub currency: String,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<i64>,
    /// Issued ticket codes; present only once the order is paid.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tickets: Vec<String>,
}

fn display_status(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "processing",
        OrderStatus::Paid => "paid",
        OrderStatus::Expired => "expired",
        OrderStatus::Cancelled => "cancelled",
    }
}

/// GET /orders/{id} - read-only order status for the buyer's status page.
///
/// Never assumes freshness beyond the last committed state; the webhook
/// path is the only writer.
pub async fn get_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderStatusResponse>> {
    let conn = state.db.get()?;

    let order = queries::get_order_by_id(&conn, &order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?;

    let tickets = if order.status == OrderStatus::Paid {
        queries::get_tickets_for_order(&conn, &order.id)?
            .into_iter()
            .map(|t| t.code)
            .collect()
    } else {
        Vec::new()
    };

    Ok(Json(OrderStatusResponse {
        order_id: order.id,
        status: order.status,
        display_status: display_status(order.status),
        quantity: order.quantity,
        total: order.total,
        currency: order.currency,
        created_at: order.created_at,
        paid_at: order.paid_at,
        tickets,
    }))
}
