mod from_row;
mod schema;
pub mod queries;

pub use from_row::FromRow;
pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::GatewayConfig;
use crate::notify::NotifyService;
use crate::payments::GatewayClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Main database pool (orders, payment records, tickets, idempotency marks)
    pub db: DbPool,
    /// Base URL for gateway callbacks (e.g. https://api.motorcards.example)
    pub base_url: String,
    /// Where the return flow sends the buyer after checkout
    pub result_page_url: String,

    /// Fixed currency for all orders (whole units, no cents)
    pub currency: String,
    /// Current ticket price; captured onto each order at creation
    pub unit_price: i64,
    /// Minutes before an unpaid gateway payment expires
    pub payment_expiry_minutes: i64,

    pub gateway: GatewayClient,
    pub gateway_config: GatewayConfig,

    pub notifier: NotifyService,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    // WAL lets concurrent webhook deliveries write without tripping over
    // status-page readers; busy_timeout queues writers instead of failing.
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
    });
    Pool::builder().max_size(10).build(manager)
}
