//! Drawdown breaker (§4.8, §9 open question 3): which PnL basis trips it.

use rust_decimal::Decimal;

/// Which PnL figure the drawdown breaker compares against NLV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PnlBasis {
    /// Realized PnL only (`total - sum(unrealized)`).
    Realized,
    /// Sum of unrealized PnL across open positions.
    Unrealized,
    /// Realized plus unrealized, as the provider itself reports it.
    #[default]
    Total,
}

impl PnlBasis {
    /// Parse the config value (`"realized"`, `"unrealized"`, `"total"`).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "realized" => Some(Self::Realized),
            "unrealized" => Some(Self::Unrealized),
            "total" => Some(Self::Total),
            _ => None,
        }
    }

    /// Select the figure to feed the breaker from a provider's total daily
    /// PnL and the sum of unrealized PnL across current positions.
    #[must_use]
    pub fn select(self, total_pnl: Decimal, unrealized_sum: Decimal) -> Decimal {
        match self {
            Self::Total => total_pnl,
            Self::Unrealized => unrealized_sum,
            Self::Realized => total_pnl.checked_sub(unrealized_sum).unwrap_or(total_pnl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn total_basis_passes_through() {
        assert_eq!(PnlBasis::Total.select(dec!(-500), dec!(-200)), dec!(-500));
    }

    #[test]
    fn unrealized_basis_uses_position_sum() {
        assert_eq!(PnlBasis::Unrealized.select(dec!(-500), dec!(-200)), dec!(-200));
    }

    #[test]
    fn realized_basis_subtracts_unrealized() {
        assert_eq!(PnlBasis::Realized.select(dec!(-500), dec!(-200)), dec!(-300));
    }

    #[test]
    fn parses_known_bases() {
        assert_eq!(PnlBasis::parse("Realized"), Some(PnlBasis::Realized));
        assert_eq!(PnlBasis::parse("total"), Some(PnlBasis::Total));
        assert_eq!(PnlBasis::parse("bogus"), None);
    }
}
