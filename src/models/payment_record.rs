use serde::{Deserialize, Serialize};

/// One gateway payment attempt bound to an order.
///
/// An order has at most one active (non-superseded) record at a time. When
/// a buyer retries checkout, a fresh record is created and the previous one
/// is marked superseded; webhooks for a superseded record update its own
/// bookkeeping but never transition the order. Records are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub order_id: String,
    /// Identifier the gateway assigned to this payment.
    pub gateway_payment_id: String,
    /// Locally generated correlation token; inbound webhooks are matched to
    /// this record by token, never by gateway-supplied order references.
    pub notification_token: String,
    /// Last status string seen from the gateway, verbatim.
    pub gateway_status: Option<String>,
    pub status_detail: Option<String>,
    pub payer_email: Option<String>,
    pub payer_name: Option<String>,
    /// Raw last-seen gateway payload, kept opaque for audit and debugging.
    pub raw_payload: Option<String>,
    pub expires_at: i64,
    pub superseded: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for recording a freshly created gateway payment.
#[derive(Debug, Clone)]
pub struct CreatePaymentRecord {
    pub order_id: String,
    pub gateway_payment_id: String,
    pub notification_token: String,
    pub expires_at: i64,
}
