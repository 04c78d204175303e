use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use motorcards::config::Config;
use motorcards::db::{create_pool, init_db, AppState};
use motorcards::handlers;
use motorcards::notify::NotifyService;
use motorcards::payments::GatewayClient;
use motorcards::sweep::spawn_sweep_task;

#[derive(Parser, Debug)]
#[command(name = "motorcards")]
#[command(about = "Order management and payment reconciliation for the MotorCards collectible raffle store")]
struct Cli {
    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "motorcards=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.gateway.skip_signature {
        tracing::warn!("Webhook signature verification is DISABLED (dev mode)");
    }

    // Create database connection pool and initialize schema
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        base_url: config.base_url.clone(),
        result_page_url: config.result_page_url.clone(),
        currency: config.currency.clone(),
        unit_price: config.unit_price,
        payment_expiry_minutes: config.payment_expiry_minutes,
        gateway: GatewayClient::new(&config.gateway),
        gateway_config: config.gateway.clone(),
        notifier: NotifyService::new(
            config.resend_api_key.clone(),
            config.notify_from.clone(),
            config.notify_webhook_url.clone(),
        ),
    };

    // Background safety net for missed webhooks
    spawn_sweep_task(
        state.clone(),
        config.sweep_interval_secs,
        config.webhook_event_retention_days,
    );

    // Build the application router
    let app = Router::new()
        // Public endpoints (rate limited per-IP)
        .merge(handlers::public::router(config.rate_limit))
        // Gateway webhook (signature auth, never throttled)
        .merge(handlers::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("MotorCards server listening on {}", addr);

    // Use into_make_service_with_connect_info to enable IP-based rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
