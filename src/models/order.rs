use serde::{Deserialize, Serialize};

/// Lifecycle state of a purchase order.
///
/// `Paid`, `Expired`, and `Cancelled` are terminal: once an order reaches
/// one of them, no further transition is permitted. Re-applying the same
/// terminal state is a no-op for idempotency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Expired,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One purchase attempt for raffle tickets. Orders are append-only audit
/// records: they are created `pending`, settled exactly once by the
/// reconciliation path, and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_phone: String,
    /// National tax id of the buyer, when provided (required for invoicing
    /// above certain amounts, optional otherwise).
    pub buyer_tax_id: Option<String>,
    /// Number of raffle tickets purchased.
    pub quantity: i64,
    /// Ticket price at creation time, in whole currency units. Issuance
    /// math uses this captured value, never the current configured price.
    pub unit_price: i64,
    /// quantity * unit_price, recomputed and asserted at creation.
    pub total: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub created_at: i64,
    pub paid_at: Option<i64>,
}

impl Order {
    /// Number of ticket units to issue when this order settles as paid.
    ///
    /// Deterministic from the captured creation-time price so a later price
    /// change can never alter what an already-created order is owed.
    pub fn units_owed(&self) -> i64 {
        self.total / self.unit_price
    }
}

/// Input for creating a new order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_phone: String,
    #[serde(default)]
    pub buyer_tax_id: Option<String>,
    pub quantity: i64,
}
