use serde::Serialize;

/// One issued raffle ticket. Tickets exist only for paid orders; the
/// (order_id, seq) pair is unique so issuance can be retried without ever
/// handing out duplicates.
#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: String,
    pub order_id: String,
    /// 1-based position within the order.
    pub seq: i64,
    /// Printable code shown to the buyer and drawn in the raffle.
    pub code: String,
    pub issued_at: i64,
}
