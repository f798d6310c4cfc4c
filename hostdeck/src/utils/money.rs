//! Currency helpers.

/// Round a USD amount to whole cents, half away from zero.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_cents() {
        assert_eq!(round_cents(10.0), 10.0);
        assert_eq!(round_cents(2.499), 2.5);
        assert_eq!(round_cents(7.594), 7.59);
        assert_eq!(round_cents(0.0), 0.0);
    }
}
