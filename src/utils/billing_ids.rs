use chrono::{DateTime, Utc};
use uuid::Uuid;

const CUSTOMER_KEY_PREFIX: &str = "inkpanel-user-";

/// Deterministic per-user customer key handed to the payment gateway.
pub fn customer_key(user_id: i64) -> String {
    format!("{CUSTOMER_KEY_PREFIX}{user_id}")
}

/// Reverse of [`customer_key`], used by the unauthenticated gateway callback
/// to recover the user behind a redirect.
pub fn user_id_from_customer_key(key: &str) -> Option<i64> {
    key.strip_prefix(CUSTOMER_KEY_PREFIX)?.parse::<i64>().ok()
}

/// Order id for the immediate first charge after billing-key issuance.
pub fn checkout_order_id(user_id: i64) -> String {
    format!("sub-{user_id}-{}", Uuid::new_v4().simple())
}

/// Order id for a scheduled renewal charge. Deterministic per subscription
/// and period so a re-run of the same batch can never double-charge under a
/// gateway-side idempotent order id.
pub fn renewal_order_id(subscription_id: i64, period_end: DateTime<Utc>) -> String {
    format!("renew-{subscription_id}-{}", period_end.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_customer_key_is_deterministic() {
        assert_eq!(customer_key(7), customer_key(7));
        assert_ne!(customer_key(7), customer_key(8));
    }

    #[test]
    fn test_customer_key_round_trip() {
        assert_eq!(user_id_from_customer_key(&customer_key(42)), Some(42));
        assert_eq!(user_id_from_customer_key("inkpanel-user-abc"), None);
        assert_eq!(user_id_from_customer_key("someone-else-42"), None);
    }

    #[test]
    fn test_checkout_order_ids_are_unique() {
        assert_ne!(checkout_order_id(1), checkout_order_id(1));
    }

    #[test]
    fn test_renewal_order_id_is_stable_per_period() {
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(renewal_order_id(5, end), renewal_order_id(5, end));
        assert_eq!(renewal_order_id(5, end), format!("renew-5-{}", end.timestamp()));

        let later = Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap();
        assert_ne!(renewal_order_id(5, end), renewal_order_id(5, later));
    }
}
