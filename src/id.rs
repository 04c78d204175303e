//! Prefixed ID generation for MotorCards entities.
//!
//! All IDs use a `mcd_` brand prefix to guarantee collision avoidance with
//! gateway-assigned identifiers (payment ids, receiver ids, etc.).
//!
//! Format: `mcd_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &["mcd_ord_", "mcd_pay_", "mcd_tkt_"];

/// Validate that a string is a valid MotorCards prefixed ID.
///
/// This is a cheap check to reject garbage before hitting the database.
/// Validates format: `mcd_{entity}_{32_hex_chars}`
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in MotorCards.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Order,
    PaymentRecord,
    Ticket,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Order => "mcd_ord",
            Self::PaymentRecord => "mcd_pay",
            Self::Ticket => "mcd_tkt",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}

/// Generate a notification token for a payment attempt.
///
/// The token correlates inbound webhooks to a payment record without
/// trusting any gateway-supplied order reference. It is high-entropy and
/// single-purpose, so it gets its own `ntk_` prefix outside the entity
/// ID space.
pub fn gen_notification_token() -> String {
    format!("ntk_{}", Uuid::new_v4().as_simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let id = EntityType::Order.gen_id();
        assert!(id.starts_with("mcd_ord_"));
        // mcd_ord_ (8 chars) + 32 hex chars = 40 chars total
        assert_eq!(id.len(), 40);
    }

    #[test]
    fn test_ids_are_unique() {
        let id1 = EntityType::Order.gen_id();
        let id2 = EntityType::Order.gen_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_is_valid_prefixed_id() {
        assert!(is_valid_prefixed_id("mcd_ord_a1b2c3d4e5f6789012345678901234ab"));
        assert!(is_valid_prefixed_id("mcd_pay_00000000000000000000000000000000"));
        assert!(is_valid_prefixed_id(&EntityType::Ticket.gen_id()));

        assert!(!is_valid_prefixed_id(""));
        assert!(!is_valid_prefixed_id("a1b2c3d4-e5f6-7890-1234-567890123456"));
        assert!(!is_valid_prefixed_id("mcd_xyz_a1b2c3d4e5f6789012345678901234ab"));
        assert!(!is_valid_prefixed_id("mcd_ord_a1b2c3d4"));
        assert!(!is_valid_prefixed_id("mcd_ord_a1b2c3d4e5f6789012345678901234gg"));
        assert!(!is_valid_prefixed_id("ord_a1b2c3d4e5f6789012345678901234ab"));
    }

    #[test]
    fn test_notification_token_format() {
        let token = gen_notification_token();
        assert!(token.starts_with("ntk_"));
        assert_eq!(token.len(), 36);
        assert_ne!(token, gen_notification_token());
    }
}
