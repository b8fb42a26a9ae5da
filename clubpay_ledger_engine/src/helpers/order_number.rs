use chrono::{DateTime, Utc};
use rand::Rng;

use crate::db_types::OrderNo;

/// How many times order creation will regenerate a colliding number before giving up. A collision
/// requires two orders in the same second to draw the same six-digit suffix, so hitting this cap
/// indicates a broken random source rather than bad luck.
pub const MAX_ORDER_NO_ATTEMPTS: usize = 10;

/// Builds a candidate order number: a 14-digit UTC timestamp prefix and a six-digit random
/// suffix. Uniqueness is the caller's responsibility (checked against the order store).
pub fn new_order_no<R: Rng>(now: DateTime<Utc>, rng: &mut R) -> OrderNo {
    let prefix = now.format("%Y%m%d%H%M%S");
    let suffix: u32 = rng.gen_range(0..1_000_000);
    OrderNo::from(format!("{prefix}{suffix:06}"))
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn number_is_time_prefix_plus_six_digits() {
        let now = Utc.with_ymd_and_hms(2024, 6, 20, 9, 30, 5).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let no = new_order_no(now, &mut rng);
        assert_eq!(no.as_str().len(), 20);
        assert!(no.as_str().starts_with("20240620093005"));
        assert!(no.as_str().chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn seeded_generator_is_deterministic() {
        let now = Utc.with_ymd_and_hms(2024, 6, 20, 9, 30, 5).unwrap();
        let a = new_order_no(now, &mut StdRng::seed_from_u64(7));
        let b = new_order_no(now, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }
}
