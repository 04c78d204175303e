use std::env;

/// Payment gateway connection settings.
///
/// `receiver_id` identifies this merchant account to the gateway and is part
/// of the webhook signature input. `secret` is the shared HMAC secret.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_url: String,
    pub receiver_id: String,
    pub secret: String,
    /// Dev-only escape hatch: skip webhook signature verification.
    /// Honored only when the server runs with MOTORCARDS_ENV=dev.
    pub skip_signature: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub result_page_url: String,
    pub dev_mode: bool,

    pub gateway: GatewayConfig,

    /// Price of one raffle ticket, in whole currency units.
    pub unit_price: i64,
    /// Fixed ISO 4217 currency code for all orders.
    pub currency: String,
    /// Minutes before an unpaid gateway payment expires.
    pub payment_expiry_minutes: i64,

    /// Reconciliation sweep interval in seconds (0 disables the sweep).
    pub sweep_interval_secs: u64,
    /// Days to keep completed idempotency marks before purging.
    pub webhook_event_retention_days: i64,

    pub rate_limit: RateLimitConfig,

    /// Resend API key for buyer notification emails (None = webhook or disabled).
    pub resend_api_key: Option<String>,
    pub notify_from: Option<String>,
    /// Operator webhook URL for DIY notification delivery.
    pub notify_webhook_url: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests per minute for /orders (calls the gateway).
    pub strict_rpm: u32,
    /// Requests per minute for status/return endpoints.
    pub standard_rpm: u32,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("MOTORCARDS_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let skip_signature = env::var("MOTORCARDS_GATEWAY_SKIP_SIGNATURE")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);

        if skip_signature && !dev_mode {
            // Refuse to run production-grade with verification off.
            panic!(
                "MOTORCARDS_GATEWAY_SKIP_SIGNATURE is set but MOTORCARDS_ENV is not dev; \
                 signature verification is mandatory outside dev mode"
            );
        }

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "motorcards.db".to_string()),
            result_page_url: env::var("RESULT_PAGE_URL")
                .unwrap_or_else(|_| format!("{}/result", base_url)),
            dev_mode,
            gateway: GatewayConfig {
                api_url: env::var("GATEWAY_API_URL")
                    .unwrap_or_else(|_| "https://gateway.example.com/api/2.0".to_string()),
                receiver_id: env::var("GATEWAY_RECEIVER_ID").unwrap_or_default(),
                secret: env::var("GATEWAY_SECRET").unwrap_or_default(),
                skip_signature: skip_signature && dev_mode,
            },
            unit_price: env::var("TICKET_UNIT_PRICE")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(2500),
            currency: env::var("CURRENCY").unwrap_or_else(|_| "CLP".to_string()),
            payment_expiry_minutes: env::var("PAYMENT_EXPIRY_MINUTES")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(60),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(300),
            webhook_event_retention_days: env::var("WEBHOOK_EVENT_RETENTION_DAYS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(7),
            rate_limit: RateLimitConfig {
                strict_rpm: env::var("RATE_LIMIT_STRICT_RPM")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(10),
                standard_rpm: env::var("RATE_LIMIT_STANDARD_RPM")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(30),
            },
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            notify_from: env::var("NOTIFY_FROM").ok(),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),
            base_url,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
