//! Unit tests for the Money module
//!
//! Tests cover minor-unit money, checked arithmetic, major-unit conversion
//! and percentage rates with half-up rounding.

use core_kernel::{Money, Currency, MoneyError, Rate};
use rust_decimal_macros::dec;

mod creation {
    use super::*;

    #[test]
    fn test_from_minor_keeps_exact_units() {
        let m = Money::from_minor(10000, Currency::MYR);
        assert_eq!(m.minor_units(), 10000);
        assert_eq!(m.amount(), dec!(100.00));
    }

    #[test]
    fn test_from_major_rounds_half_up() {
        assert_eq!(Money::from_major(dec!(10.005), Currency::MYR).unwrap().minor_units(), 1001);
        assert_eq!(Money::from_major(dec!(10.004), Currency::MYR).unwrap().minor_units(), 1000);
    }

    #[test]
    fn test_jpy_has_no_minor_units() {
        let m = Money::from_major(dec!(1500), Currency::JPY).unwrap();
        assert_eq!(m.minor_units(), 1500);
        assert_eq!(m.to_string(), "¥ 1500");
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!("myr".parse::<Currency>().unwrap(), Currency::MYR);
        assert!(matches!(
            "XYZ".parse::<Currency>(),
            Err(MoneyError::UnknownCurrency(_))
        ));
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_checked_add_and_sub() {
        let a = Money::from_minor(3000, Currency::MYR);
        let b = Money::from_minor(5000, Currency::MYR);

        assert_eq!(a.checked_add(&b).unwrap().minor_units(), 8000);
        assert_eq!(a.checked_sub(&b).unwrap().minor_units(), -2000);
    }

    #[test]
    fn test_overflow_is_reported() {
        let a = Money::from_minor(i64::MAX, Currency::MYR);
        let b = Money::from_minor(1, Currency::MYR);

        assert_eq!(a.checked_add(&b), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_sum_of_amounts() {
        let amounts = vec![
            Money::from_minor(1000, Currency::MYR),
            Money::from_minor(500, Currency::MYR),
            Money::from_minor(-250, Currency::MYR),
        ];

        let total = Money::sum(Currency::MYR, &amounts).unwrap();
        assert_eq!(total.minor_units(), 1250);
    }

    #[test]
    fn test_sum_rejects_mixed_currencies() {
        let amounts = vec![
            Money::from_minor(1000, Currency::MYR),
            Money::from_minor(500, Currency::SGD),
        ];

        assert!(Money::sum(Currency::MYR, &amounts).is_err());
    }

    #[test]
    fn test_negation_and_abs() {
        let m = Money::from_minor(1234, Currency::MYR);
        assert_eq!((-m).minor_units(), -1234);
        assert_eq!((-m).abs(), m);
        assert!((-m).is_negative());
    }
}

mod rates {
    use super::*;

    #[test]
    fn test_ten_percent_of_one_hundred_ringgit() {
        let rate = Rate::from_percentage(dec!(10)).unwrap();
        let commission = rate.apply(&Money::from_minor(10000, Currency::MYR)).unwrap();

        assert_eq!(commission, Money::from_minor(1000, Currency::MYR));
    }

    #[test]
    fn test_fractional_percentage_rounds_half_up_not_truncates() {
        // 3.75% of RM 12.34 = 46.275 sen
        let rate = Rate::from_percentage(dec!(3.75)).unwrap();
        let commission = rate.apply(&Money::from_minor(1234, Currency::MYR)).unwrap();

        assert_eq!(commission.minor_units(), 46);

        // 12.5% of RM 0.33 = 4.125 sen, 12.5% of RM 0.36 = 4.5 sen
        let rate = Rate::from_percentage(dec!(12.5)).unwrap();
        assert_eq!(rate.apply(&Money::from_minor(33, Currency::MYR)).unwrap().minor_units(), 4);
        assert_eq!(rate.apply(&Money::from_minor(36, Currency::MYR)).unwrap().minor_units(), 5);
    }

    #[test]
    fn test_rate_display() {
        let rate = Rate::from_percentage(dec!(7.50)).unwrap();
        assert_eq!(rate.to_string(), "7.5%");
        assert_eq!(rate.as_decimal(), dec!(0.075));
    }

    #[test]
    fn test_rate_serialization() {
        let rate = Rate::from_percentage(dec!(5)).unwrap();
        let json = serde_json::to_string(&rate).unwrap();
        let back: Rate = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rate);
    }
}
