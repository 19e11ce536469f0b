//! Flat delivery fee per region code, in GHS.

use rust_decimal::Decimal;

/// Charged for any region code not listed in [`REGION_FEES`].
pub const DEFAULT_DELIVERY_FEE: i64 = 50;

pub const REGION_FEES: [(&str, i64); 16] = [
    ("greater-accra", 20),
    ("ashanti", 30),
    ("eastern", 35),
    ("central", 35),
    ("western", 40),
    ("volta", 45),
    ("western-north", 45),
    ("bono", 50),
    ("ahafo", 50),
    ("bono-east", 55),
    ("oti", 55),
    ("northern", 60),
    ("savannah", 65),
    ("north-east", 65),
    ("upper-east", 70),
    ("upper-west", 70),
];

/// Exact, case-sensitive match on the region code.
pub fn calculate_delivery_fee(region: &str) -> Decimal {
    let fee = REGION_FEES
        .iter()
        .find(|(code, _)| *code == region)
        .map(|(_, fee)| *fee)
        .unwrap_or(DEFAULT_DELIVERY_FEE);
    Decimal::from(fee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case("greater-accra", dec!(20))]
    #[case("ashanti", dec!(30))]
    #[case("central", dec!(35))]
    #[case("western-north", dec!(45))]
    #[case("bono-east", dec!(55))]
    #[case("northern", dec!(60))]
    #[case("north-east", dec!(65))]
    #[case("upper-west", dec!(70))]
    fn known_regions(#[case] region: &str, #[case] expected: Decimal) {
        assert_eq!(calculate_delivery_fee(region), expected);
    }

    #[rstest]
    #[case("")]
    #[case("Greater-Accra")]
    #[case(" ashanti")]
    #[case("lagos")]
    fn unknown_regions_fall_back_to_default(#[case] region: &str) {
        assert_eq!(calculate_delivery_fee(region), dec!(50));
    }
}
