use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Orders (one purchase attempt; append-only, never deleted)
        -- unit_price is captured at creation: issuance math must never see a
        -- later price change.
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            buyer_name TEXT NOT NULL,
            buyer_email TEXT NOT NULL,
            buyer_phone TEXT NOT NULL,
            buyer_tax_id TEXT,
            quantity INTEGER NOT NULL,
            unit_price INTEGER NOT NULL,
            total INTEGER NOT NULL,
            currency TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'paid', 'expired', 'cancelled')),
            created_at INTEGER NOT NULL,
            paid_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status, created_at);
        CREATE INDEX IF NOT EXISTS idx_orders_buyer_email ON orders(buyer_email);

        -- Payment records (one gateway attempt per row; never deleted)
        -- notification_token is the only key webhooks are matched on.
        -- At most one non-superseded record per order; a checkout retry
        -- supersedes the previous attempt.
        CREATE TABLE IF NOT EXISTS payment_records (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id),
            gateway_payment_id TEXT NOT NULL,
            notification_token TEXT NOT NULL UNIQUE,
            gateway_status TEXT,
            status_detail TEXT,
            payer_email TEXT,
            payer_name TEXT,
            raw_payload TEXT,
            expires_at INTEGER NOT NULL,
            superseded INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_payment_records_order ON payment_records(order_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_payment_records_active
            ON payment_records(order_id) WHERE superseded = 0;
        CREATE INDEX IF NOT EXISTS idx_payment_records_expiry
            ON payment_records(expires_at) WHERE superseded = 0;

        -- Idempotency marks for webhook processing, keyed by notification
        -- token. A row with completed_at set means the side-effect branch ran
        -- to completion; a row without it is an in-flight claim that becomes
        -- reclaimable once stale.
        CREATE TABLE IF NOT EXISTS webhook_events (
            notification_token TEXT PRIMARY KEY,
            claimed_at INTEGER NOT NULL,
            completed_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_completed ON webhook_events(completed_at);

        -- Issued raffle tickets. UNIQUE(order_id, seq) makes issuance
        -- retry-safe: re-running issuance for an order can never mint extras.
        CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL REFERENCES orders(id),
            seq INTEGER NOT NULL,
            code TEXT NOT NULL UNIQUE,
            issued_at INTEGER NOT NULL,
            UNIQUE(order_id, seq)
        );
        CREATE INDEX IF NOT EXISTS idx_tickets_order ON tickets(order_id);
        "#,
    )?;
    Ok(())
}
