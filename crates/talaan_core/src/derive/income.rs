//! Income-class bucketing.
//!
//! # Responsibility
//! - Map a household's monthly income total to its seven-class bracket.
//!
//! # Invariants
//! - Total over every decimal input; negative totals classify as `Poor`.
//! - Monotone: a larger total never yields a lower class.

use crate::model::household::IncomeClass;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;

/// Exclusive upper bound of each class below `Rich`, PHP per month.
static BRACKET_CEILINGS: Lazy<[(Decimal, IncomeClass); 6]> = Lazy::new(|| {
    [
        (Decimal::from(10_957), IncomeClass::Poor),
        (Decimal::from(21_914), IncomeClass::LowIncome),
        (Decimal::from(43_828), IncomeClass::LowerMiddleClass),
        (Decimal::from(76_669), IncomeClass::MiddleClass),
        (Decimal::from(131_484), IncomeClass::UpperMiddleIncome),
        (Decimal::from(219_140), IncomeClass::HighIncome),
    ]
});

/// Classifies a monthly household income total.
pub fn income_class_for(total: Decimal) -> IncomeClass {
    for (ceiling, class) in BRACKET_CEILINGS.iter() {
        if total < *ceiling {
            return *class;
        }
    }
    IncomeClass::Rich
}

#[cfg(test)]
mod tests {
    use super::income_class_for;
    use crate::model::household::IncomeClass;
    use rust_decimal::Decimal;

    #[test]
    fn classifies_each_bracket_boundary() {
        let cases = [
            (Decimal::from(0), IncomeClass::Poor),
            (Decimal::from(10_956), IncomeClass::Poor),
            (Decimal::from(10_957), IncomeClass::LowIncome),
            (Decimal::from(21_913), IncomeClass::LowIncome),
            (Decimal::from(21_914), IncomeClass::LowerMiddleClass),
            (Decimal::from(43_828), IncomeClass::MiddleClass),
            (Decimal::from(76_669), IncomeClass::UpperMiddleIncome),
            (Decimal::from(131_484), IncomeClass::HighIncome),
            (Decimal::from(219_139), IncomeClass::HighIncome),
            (Decimal::from(219_140), IncomeClass::Rich),
            (Decimal::from(1_000_000), IncomeClass::Rich),
        ];
        for (total, expected) in cases {
            assert_eq!(income_class_for(total), expected, "total {total}");
        }
    }

    #[test]
    fn fractional_totals_just_below_a_ceiling_stay_in_the_lower_class() {
        let just_below = Decimal::new(10_956_99, 2);
        assert_eq!(income_class_for(just_below), IncomeClass::Poor);
    }

    #[test]
    fn negative_totals_classify_as_poor() {
        assert_eq!(income_class_for(Decimal::from(-50)), IncomeClass::Poor);
    }

    #[test]
    fn classification_is_monotone() {
        let samples = [
            Decimal::from(-1),
            Decimal::from(0),
            Decimal::from(10_957),
            Decimal::from(15_000),
            Decimal::from(43_827),
            Decimal::from(76_700),
            Decimal::from(131_484),
            Decimal::from(219_140),
            Decimal::from(500_000),
        ];
        for pair in samples.windows(2) {
            assert!(
                income_class_for(pair[0]) <= income_class_for(pair[1]),
                "classes must not decrease from {} to {}",
                pair[0],
                pair[1]
            );
        }
    }
}
