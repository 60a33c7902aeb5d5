//! Unit tests for minor-unit amounts and percentages
//!
//! Tests cover the floor policy, clamping and the figures used by the
//! reference franchise calculation.

use core_kernel::{Amount, MoneyError, Percent};
use rust_decimal_macros::dec;

mod amounts {
    use super::*;

    #[test]
    fn test_zero_is_default() {
        assert_eq!(Amount::default(), Amount::zero());
        assert!(Amount::zero().is_zero());
    }

    #[test]
    fn test_checked_sub_allows_negative_results() {
        let result = Amount::new(100).checked_sub(Amount::new(250)).unwrap();
        assert!(result.is_negative());
        assert_eq!(result.minor_units(), -150);
    }

    #[test]
    fn test_saturating_sub_stops_at_zero() {
        let remaining = Amount::new(100).saturating_sub_floor_zero(Amount::new(250));
        assert_eq!(remaining, Amount::zero());
    }

    #[test]
    fn test_from_decimal_floor_rounds_down() {
        assert_eq!(Amount::from_decimal_floor(dec!(10.99)).unwrap(), Amount::new(10));
        assert_eq!(Amount::from_decimal_floor(dec!(-10.01)).unwrap(), Amount::new(-11));
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&Amount::new(700_000)).unwrap();
        assert_eq!(json, "700000");
    }
}

mod percentages {
    use super::*;

    #[test]
    fn test_franchise_share_of_approved_amount() {
        let coverage = Percent::new(dec!(80));
        let franchise = coverage.complement().apply(Amount::new(700_000)).unwrap();
        assert_eq!(franchise, Amount::new(140_000));
    }

    #[test]
    fn test_clamp_caps_at_hundred() {
        let boosted = Percent::new(dec!(105));
        assert_eq!(boosted.clamp_within(Percent::zero(), Percent::hundred()), Percent::hundred());
    }

    #[test]
    fn test_apply_bounded_honours_minimum() {
        let share = Percent::new(dec!(1))
            .apply_bounded(Amount::new(100_000), Amount::new(5_000), Amount::new(50_000))
            .unwrap();
        assert_eq!(share, Amount::new(5_000));
    }

    #[test]
    fn test_apply_bounded_rejects_inverted_bounds() {
        let err = Percent::new(dec!(10))
            .apply_bounded(Amount::new(100), Amount::new(50), Amount::new(10))
            .unwrap_err();
        assert_eq!(err, MoneyError::InvalidBounds { min: 50, max: 10 });
    }

    #[test]
    fn test_display() {
        assert_eq!(Percent::new(dec!(80)).to_string(), "80%");
    }
}
