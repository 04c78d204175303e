use axum::{extract::State, response::Redirect};
use serde::Deserialize;

use crate::db::{queries, AppState};
use crate::error::{msg, AppError, Result};
use crate::extractors::Query;
use crate::models::OrderStatus;
use crate::util::append_query_params;

#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
    pub order: String,
}

/// GET /payments/return - where the gateway sends the buyer back after
/// checkout (success or cancel page alike).
///
/// Strictly read-only: the webhook is the settlement path, and it races this
/// redirect. Whatever state is committed right now is what the buyer sees;
/// a not-yet-settled order redirects with status=processing and the result
/// page polls the status endpoint.
pub async fn payment_return(
    State(state): State<AppState>,
    Query(query): Query<ReturnQuery>,
) -> Result<Redirect> {
    let conn = state.db.get()?;

    let order = queries::get_order_by_id(&conn, &query.order)?
        .ok_or_else(|| AppError::NotFound(msg::ORDER_NOT_FOUND.into()))?;

    let status = match order.status {
        OrderStatus::Pending => "processing",
        OrderStatus::Paid => "paid",
        OrderStatus::Expired => "expired",
        OrderStatus::Cancelled => "cancelled",
    };

    let redirect_url = append_query_params(
        &state.result_page_url,
        &[("order", &order.id), ("status", status)],
    );

    Ok(Redirect::temporary(&redirect_url))
}
