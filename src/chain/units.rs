/// Display unit for value fields in reconstructed history.
///
/// Conversion is applied once, as the final pass over a history page, so
/// rounding error enters each displayed number at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unit {
    /// Base ledger units
    #[default]
    Satoshis,
    /// Whole coins (10^8 base units)
    Coins,
}

const BASE_UNITS_PER_COIN: f64 = 100_000_000.0;

impl Unit {
    /// Convert an amount in base units into this display unit.
    pub fn from_base(self, satoshis: i64) -> f64 {
        match self {
            Unit::Satoshis => satoshis as f64,
            Unit::Coins => satoshis as f64 / BASE_UNITS_PER_COIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_unit_is_identity() {
        assert_eq!(Unit::Satoshis.from_base(12_345), 12_345.0);
        assert_eq!(Unit::Satoshis.from_base(-50_000), -50_000.0);
    }

    #[test]
    fn test_coin_conversion() {
        assert_eq!(Unit::Coins.from_base(100_000_000), 1.0);
        assert_eq!(Unit::Coins.from_base(-4_999), -0.00004999);
    }
}
