//! Buyer notification service.
//!
//! Fired after an order reaches a terminal state. Supports three modes:
//! 1. Send via Resend API (default when API key available)
//! 2. POST to an operator webhook URL (for DIY delivery)
//! 3. Disabled (log only)
//!
//! Notifications are strictly best-effort: they run in spawned tasks, retry
//! transient failures a bounded number of times, and never feed back into
//! order state. An order must not revert to pending because an email failed.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;

/// Retry delays in seconds for transient notification failures.
const RETRY_DELAYS: &[u64] = &[1, 4, 16];

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// What happened to an order, from the buyer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentConfirmed,
    PaymentExpired,
    PaymentCancelled,
}

impl NotificationKind {
    fn subject(&self) -> &'static str {
        match self {
            Self::PaymentConfirmed => "Your MotorCards tickets are in!",
            Self::PaymentExpired => "Your MotorCards payment expired",
            Self::PaymentCancelled => "Your MotorCards payment was cancelled",
        }
    }

    fn event_name(&self) -> &'static str {
        match self {
            Self::PaymentConfirmed => "payment_confirmed",
            Self::PaymentExpired => "payment_expired",
            Self::PaymentCancelled => "payment_cancelled",
        }
    }
}

/// Owned notification payload, cheap to move into a spawned task.
#[derive(Debug, Clone, Serialize)]
pub struct BuyerNotification {
    pub kind: NotificationKind,
    pub order_id: String,
    pub buyer_email: String,
    pub buyer_name: String,
    pub quantity: i64,
    pub total: i64,
    pub currency: String,
    /// Issued ticket codes; empty unless the payment was confirmed.
    pub ticket_codes: Vec<String>,
}

/// Result of attempting to deliver a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyResult {
    Sent,
    WebhookCalled,
    Disabled,
}

/// Webhook payload sent when NOTIFY_WEBHOOK_URL is configured.
#[derive(Debug, Serialize)]
struct NotifyWebhookPayload<'a> {
    event: &'static str,
    order_id: &'a str,
    email: &'a str,
    name: &'a str,
    quantity: i64,
    total: i64,
    currency: &'a str,
    ticket_codes: &'a [String],
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: String,
}

#[derive(Debug, Clone)]
pub struct NotifyService {
    http_client: Client,
    resend_api_key: Option<String>,
    from: Option<String>,
    webhook_url: Option<String>,
}

impl NotifyService {
    pub fn new(
        resend_api_key: Option<String>,
        from: Option<String>,
        webhook_url: Option<String>,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build notifier HTTP client");

        Self {
            http_client,
            resend_api_key,
            from,
            webhook_url,
        }
    }

    /// Deliver a notification, retrying transient failures.
    pub async fn send(&self, notification: &BuyerNotification) -> NotifyResult {
        for (attempt, delay_secs) in std::iter::once(&0u64).chain(RETRY_DELAYS).enumerate() {
            if *delay_secs > 0 {
                tracing::warn!(
                    attempt,
                    delay_secs,
                    order_id = %notification.order_id,
                    "Retrying buyer notification after transient failure"
                );
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match self.send_once(notification).await {
                Ok(result) => {
                    tracing::info!(
                        order_id = %notification.order_id,
                        event = notification.kind.event_name(),
                        "Buyer notification delivered"
                    );
                    return result;
                }
                Err(is_transient) if is_transient => continue,
                Err(_) => {
                    // Non-transient rejection: delivery target refused it,
                    // nothing a retry would change.
                    tracing::error!(
                        order_id = %notification.order_id,
                        event = notification.kind.event_name(),
                        "Buyer notification rejected by delivery target"
                    );
                    return NotifyResult::Disabled;
                }
            }
        }

        tracing::error!(
            order_id = %notification.order_id,
            event = notification.kind.event_name(),
            attempts = RETRY_DELAYS.len() + 1,
            "Buyer notification failed after all retries"
        );
        NotifyResult::Disabled
    }

    /// One delivery attempt. Err(is_transient) on failure.
    async fn send_once(
        &self,
        notification: &BuyerNotification,
    ) -> std::result::Result<NotifyResult, bool> {
        if let (Some(api_key), Some(from)) = (&self.resend_api_key, &self.from) {
            self.send_resend(api_key, from, notification).await?;
            return Ok(NotifyResult::Sent);
        }

        if let Some(url) = &self.webhook_url {
            self.call_webhook(url, notification).await?;
            return Ok(NotifyResult::WebhookCalled);
        }

        tracing::info!(
            order_id = %notification.order_id,
            event = notification.kind.event_name(),
            "Notification delivery disabled; logging only"
        );
        Ok(NotifyResult::Disabled)
    }

    async fn send_resend(
        &self,
        api_key: &str,
        from: &str,
        notification: &BuyerNotification,
    ) -> std::result::Result<(), bool> {
        let body = ResendRequest {
            from,
            to: [notification.buyer_email.as_str()],
            subject: notification.kind.subject(),
            text: render_text(notification),
        };

        let response = self
            .http_client
            .post(RESEND_API_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to reach Resend API");
                true
            })?;

        classify_response(response).await
    }

    async fn call_webhook(
        &self,
        webhook_url: &str,
        notification: &BuyerNotification,
    ) -> std::result::Result<(), bool> {
        let payload = NotifyWebhookPayload {
            event: notification.kind.event_name(),
            order_id: &notification.order_id,
            email: &notification.buyer_email,
            name: &notification.buyer_name,
            quantity: notification.quantity,
            total: notification.total,
            currency: &notification.currency,
            ticket_codes: &notification.ticket_codes,
        };

        let response = self
            .http_client
            .post(webhook_url)
            .header("X-Motorcards-Event", notification.kind.event_name())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, webhook_url = %webhook_url, "Failed to send notification webhook");
                true
            })?;

        classify_response(response).await
    }
}

async fn classify_response(response: reqwest::Response) -> std::result::Result<(), bool> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    let is_transient = status.as_u16() == 429 || status.is_server_error();
    tracing::warn!(status = %status, body = %body, "Notification delivery returned an error");
    Err(is_transient)
}

fn render_text(notification: &BuyerNotification) -> String {
    match notification.kind {
        NotificationKind::PaymentConfirmed => {
            let codes = notification.ticket_codes.join("\n  ");
            format!(
                "Hi {},\n\nYour payment of {} {} was confirmed. \
                 You hold {} raffle ticket(s):\n\n  {}\n\nGood luck!\nOrder {}",
                notification.buyer_name,
                notification.total,
                notification.currency,
                notification.quantity,
                codes,
                notification.order_id,
            )
        }
        NotificationKind::PaymentExpired => format!(
            "Hi {},\n\nYour payment for order {} was not completed before it \
             expired. No charge was made; you can start a new purchase at any \
             time.",
            notification.buyer_name, notification.order_id,
        ),
        NotificationKind::PaymentCancelled => format!(
            "Hi {},\n\nYour payment for order {} was cancelled. No charge was \
             made.",
            notification.buyer_name, notification.order_id,
        ),
    }
}

/// Spawn a fire-and-forget buyer notification.
///
/// Panics in the spawned task are logged rather than silently swallowed.
pub fn spawn_notification(service: NotifyService, notification: BuyerNotification) {
    let order_id = notification.order_id.clone();
    tokio::spawn(
        AssertUnwindSafe(async move {
            service.send(&notification).await;
        })
        .catch_unwind()
        .map(move |result| {
            if let Err(panic) = result {
                let panic_msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Notification task panicked for order {}: {}", order_id, panic_msg);
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: NotificationKind) -> BuyerNotification {
        BuyerNotification {
            kind,
            order_id: "mcd_ord_x".into(),
            buyer_email: "ana@example.com".into(),
            buyer_name: "Ana".into(),
            quantity: 2,
            total: 5000,
            currency: "CLP".into(),
            ticket_codes: vec!["MC-AAAAA-11111".into(), "MC-BBBBB-22222".into()],
        }
    }

    #[test]
    fn test_confirmation_lists_ticket_codes() {
        let text = render_text(&sample(NotificationKind::PaymentConfirmed));
        assert!(text.contains("MC-AAAAA-11111"));
        assert!(text.contains("MC-BBBBB-22222"));
        assert!(text.contains("2 raffle ticket(s)"));
    }

    #[test]
    fn test_expiry_mentions_no_charge() {
        let text = render_text(&sample(NotificationKind::PaymentExpired));
        assert!(text.contains("No charge was made"));
    }

    #[tokio::test]
    async fn test_disabled_service_is_noop() {
        let service = NotifyService::new(None, None, None);
        let result = service.send(&sample(NotificationKind::PaymentCancelled)).await;
        assert_eq!(result, NotifyResult::Disabled);
    }
}
