use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::{queries, AppState};
use crate::error::AppError;
use crate::payments::verify_signature;

use super::common::{reconcile_payment_record, ReconcileOutcome, WebhookResult};

/// Header carrying the gateway's webhook signature.
const SIGNATURE_HEADER: &str = "x-gateway-signature";
/// Optional header declaring the gateway API version the signature uses.
const API_VERSION_HEADER: &str = "x-api-version";

/// Extract the notification token from a webhook body.
///
/// The gateway has shipped both JSON and form-encoded payloads over its API
/// versions, and renamed the field from `token` to `notification_token`
/// along the way; both spellings stay accepted.
fn extract_notification_token(body: &Bytes) -> Option<String> {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        return value
            .get("notification_token")
            .or_else(|| value.get("token"))
            .and_then(|v| v.as_str())
            .map(String::from);
    }

    if let Ok(fields) = serde_urlencoded::from_bytes::<HashMap<String, String>>(body) {
        return fields
            .get("notification_token")
            .or_else(|| fields.get("token"))
            .cloned();
    }

    None
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Axum handler for `POST /webhooks/payment`.
///
/// Responses follow the gateway's retry contract: 400 only for bodies we
/// could never act on, 401 for signature failures, and 200 for everything
/// else - including unknown tokens and duplicates - so the gateway stops
/// retrying once a delivery has been meaningfully received.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    process_payment_webhook(&state, &headers, &body).await
}

async fn process_payment_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> WebhookResult {
    let Some(token) = extract_notification_token(body) else {
        return (StatusCode::BAD_REQUEST, "Missing notification token");
    };

    if state.gateway_config.skip_signature {
        tracing::warn!("Webhook signature verification skipped (dev mode)");
    } else {
        let Some(signature) = header_str(headers, SIGNATURE_HEADER) else {
            tracing::warn!(token = %token, "Webhook rejected: missing signature header");
            return (StatusCode::UNAUTHORIZED, "Missing signature");
        };
        let api_version = header_str(headers, API_VERSION_HEADER);

        if !verify_signature(
            &token,
            api_version,
            &state.gateway_config.receiver_id,
            &state.gateway_config.secret,
            signature,
        ) {
            tracing::warn!(
                token = %token,
                api_version = api_version.unwrap_or("default"),
                "Webhook rejected: invalid signature"
            );
            return (StatusCode::UNAUTHORIZED, "Invalid signature");
        }
    }

    let record = {
        let conn = match state.db.get() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("DB connection error: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
            }
        };

        match queries::get_payment_record_by_token(&conn, &token) {
            Ok(Some(r)) => r,
            Ok(None) => {
                // Deliberate 200: an unknown token is "not our concern, stop
                // retrying", never an error that provokes retries. Kept at
                // WARN so deployments can alert if this starts masking a
                // persistence-ordering bug.
                tracing::warn!(token = %token, "unknown notification token");
                return (StatusCode::OK, "Unknown token");
            }
            Err(e) => {
                tracing::error!("DB error: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
            }
        }
    };

    match reconcile_payment_record(state, &record).await {
        Ok(ReconcileOutcome::Settled(status)) => {
            tracing::info!(order_id = %record.order_id, status = %status, "Webhook settled order");
            (StatusCode::OK, "OK")
        }
        Ok(ReconcileOutcome::StillPending) => (StatusCode::OK, "Payment not settled yet"),
        Ok(ReconcileOutcome::NoOp) => (StatusCode::OK, "Already processed"),
        // The payment is settled from the gateway's perspective; failing to
        // acknowledge would only trigger pointless retries. The claim has
        // already been released and the sweep will re-reconcile.
        Err(AppError::GatewayUnavailable(_)) => (StatusCode::OK, "Acknowledged; reconciliation deferred"),
        Err(AppError::GatewayRejected(_)) => (StatusCode::OK, "Acknowledged; fetch rejected"),
        Err(e) => {
            tracing::error!(order_id = %record.order_id, "Webhook reconciliation failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Reconciliation error")
        }
    }
}
