//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const ORDER_COLS: &str = "id, buyer_name, buyer_email, buyer_phone, buyer_tax_id, quantity, unit_price, total, currency, status, created_at, paid_at";

pub const PAYMENT_RECORD_COLS: &str = "id, order_id, gateway_payment_id, notification_token, gateway_status, status_detail, payer_email, payer_name, raw_payload, expires_at, superseded, created_at, updated_at";

pub const TICKET_COLS: &str = "id, order_id, seq, code, issued_at";

// ============ FromRow Implementations ============

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            buyer_name: row.get(1)?,
            buyer_email: row.get(2)?,
            buyer_phone: row.get(3)?,
            buyer_tax_id: row.get(4)?,
            quantity: row.get(5)?,
            unit_price: row.get(6)?,
            total: row.get(7)?,
            currency: row.get(8)?,
            status: parse_enum(row, 9, "status")?,
            created_at: row.get(10)?,
            paid_at: row.get(11)?,
        })
    }
}

impl FromRow for PaymentRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentRecord {
            id: row.get(0)?,
            order_id: row.get(1)?,
            gateway_payment_id: row.get(2)?,
            notification_token: row.get(3)?,
            gateway_status: row.get(4)?,
            status_detail: row.get(5)?,
            payer_email: row.get(6)?,
            payer_name: row.get(7)?,
            raw_payload: row.get(8)?,
            expires_at: row.get(9)?,
            superseded: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

impl FromRow for Ticket {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Ticket {
            id: row.get(0)?,
            order_id: row.get(1)?,
            seq: row.get(2)?,
            code: row.get(3)?,
            issued_at: row.get(4)?,
        })
    }
}
