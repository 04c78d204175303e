use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::config::GatewayConfig;
use crate::error::AppError;

/// Bound on every outbound gateway call. A webhook handler blocked on the
/// gateway must fail fast enough to release its idempotency claim and let
/// the gateway's own retry redeliver.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Failure taxonomy for gateway calls.
///
/// `Unavailable` is transient (network, timeout, 5xx) and safe to retry;
/// `Rejected` is a business-level 4xx and must never be retried blindly.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unavailable(msg) => AppError::GatewayUnavailable(msg),
            GatewayError::Rejected(msg) => AppError::GatewayRejected(msg),
        }
    }
}

/// A successfully created gateway payment.
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub gateway_payment_id: String,
    /// URL the buyer is redirected to for checkout.
    pub redirect_url: String,
    /// Our notification token, echoed back by the gateway.
    pub notification_token: String,
}

/// Canonical payment state as reported by the gateway itself.
///
/// This snapshot, never a webhook body, is the single source of truth for
/// order transitions.
#[derive(Debug, Clone)]
pub struct PaymentStatusSnapshot {
    pub status: String,
    pub status_detail: Option<String>,
    pub payer_email: Option<String>,
    pub payer_name: Option<String>,
    pub paid_at: Option<i64>,
    pub expires_at: Option<i64>,
    /// Verbatim response body, retained on the payment record for audit.
    pub raw_payload: String,
}

#[derive(Debug, Deserialize)]
struct CreatePaymentResponse {
    payment_id: String,
    payment_url: String,
    notification_token: String,
}

#[derive(Debug, Deserialize)]
struct PaymentStatusResponse {
    status: String,
    #[serde(default)]
    status_detail: Option<String>,
    #[serde(default)]
    payer_email: Option<String>,
    #[serde(default)]
    payer_name: Option<String>,
    #[serde(default)]
    paid_at: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
}

/// Input for creating a gateway payment.
#[derive(Debug)]
pub struct CreatePaymentRequest<'a> {
    pub order_id: &'a str,
    pub subject: &'a str,
    pub amount: i64,
    pub currency: &'a str,
    pub buyer_email: &'a str,
    pub buyer_name: &'a str,
    pub notification_token: &'a str,
    pub notify_url: &'a str,
    pub return_url: &'a str,
    pub cancel_url: &'a str,
    pub expires_at: i64,
}

/// Thin adapter over the payment gateway's HTTP API.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    api_url: String,
    receiver_id: String,
    secret: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build gateway HTTP client");

        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            receiver_id: config.receiver_id.clone(),
            secret: config.secret.clone(),
        }
    }

    /// Create a payment and obtain the checkout redirect URL.
    ///
    /// The notification token is generated locally and echoed back by the
    /// gateway; it is the only correlation key trusted on inbound webhooks.
    pub async fn create_payment(
        &self,
        req: &CreatePaymentRequest<'_>,
    ) -> Result<CreatedPayment, GatewayError> {
        let response = self
            .client
            .post(format!("{}/payments", self.api_url))
            .basic_auth(&self.receiver_id, Some(&self.secret))
            .form(&[
                ("transaction_id", req.order_id),
                ("subject", req.subject),
                ("amount", &req.amount.to_string()),
                ("currency", req.currency),
                ("payer_email", req.buyer_email),
                ("payer_name", req.buyer_name),
                ("notification_token", req.notification_token),
                ("notify_url", req.notify_url),
                ("return_url", req.return_url),
                ("cancel_url", req.cancel_url),
                ("expires_at", &req.expires_at.to_string()),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("create payment: {}", e)))?;

        let payload: CreatePaymentResponse = Self::read_json(response, "create payment").await?;

        Ok(CreatedPayment {
            gateway_payment_id: payload.payment_id,
            redirect_url: payload.payment_url,
            notification_token: payload.notification_token,
        })
    }

    /// Fetch the authoritative status of a payment.
    ///
    /// Webhook payloads only trigger this call; their self-reported status
    /// never drives a transition directly, which neutralizes forged or
    /// stale webhook bodies even if signature checking were bypassed.
    pub async fn fetch_payment_status(
        &self,
        gateway_payment_id: &str,
    ) -> Result<PaymentStatusSnapshot, GatewayError> {
        let response = self
            .client
            .get(format!("{}/payments/{}", self.api_url, gateway_payment_id))
            .basic_auth(&self.receiver_id, Some(&self.secret))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("fetch status: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_http_error("fetch status", status, body));
        }

        let raw = response
            .text()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("fetch status body: {}", e)))?;

        let payload: PaymentStatusResponse = serde_json::from_str(&raw)
            .map_err(|e| GatewayError::Rejected(format!("unparseable status response: {}", e)))?;

        Ok(PaymentStatusSnapshot {
            status: payload.status,
            status_detail: payload.status_detail,
            payer_email: payload.payer_email,
            payer_name: payload.payer_name,
            paid_at: payload.paid_at,
            expires_at: payload.expires_at,
            raw_payload: raw,
        })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        context: &str,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_http_error(context, status, body));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("{}: unparseable response: {}", context, e)))
    }

    fn classify_http_error(
        context: &str,
        status: reqwest::StatusCode,
        body: String,
    ) -> GatewayError {
        if status.is_client_error() {
            GatewayError::Rejected(format!("{}: {} {}", context, status, body))
        } else {
            GatewayError::Unavailable(format!("{}: {} {}", context, status, body))
        }
    }
}
