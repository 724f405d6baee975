use crate::error::RiskError;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::str::FromStr;

/// The mutable risk parameters, closed per §3/§4.3. `set_limit`/`override_limit`
/// reject any name outside this set.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum RiskParam {
    /// Maximum position size as a percentage of NLV.
    MaxPositionPct,
    /// Maximum notional value of a single order.
    MaxOrderValue,
    /// Maximum daily loss as a percentage of NLV.
    MaxDailyLossPct,
    /// Maximum sector exposure as a percentage of NLV.
    MaxSectorExposurePct,
    /// Maximum single-name exposure as a percentage of NLV.
    MaxSingleNamePct,
    /// Maximum number of simultaneously open orders.
    MaxOpenOrders,
    /// Maximum order submissions per rolling 60-second window.
    OrderRateLimit,
    /// Width of the duplicate-order fingerprint window, in seconds.
    DuplicateWindowSeconds,
    /// Only these uppercased symbols may be traded, when non-empty.
    SymbolAllowlist,
    /// Uppercased symbols that may never be traded.
    SymbolBlocklist,
}

impl RiskParam {
    /// Every mutable parameter, in a stable order (used for "valid params" messages).
    #[must_use]
    pub fn all() -> [Self; 10] {
        [
            Self::MaxPositionPct,
            Self::MaxOrderValue,
            Self::MaxDailyLossPct,
            Self::MaxSectorExposurePct,
            Self::MaxSingleNamePct,
            Self::MaxOpenOrders,
            Self::OrderRateLimit,
            Self::DuplicateWindowSeconds,
            Self::SymbolAllowlist,
            Self::SymbolBlocklist,
        ]
    }

    /// True for the eight float/int params; false for the two symbol-list params.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::SymbolAllowlist | Self::SymbolBlocklist)
    }

    /// The wire/config name, e.g. `"max_position_pct"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MaxPositionPct => "max_position_pct",
            Self::MaxOrderValue => "max_order_value",
            Self::MaxDailyLossPct => "max_daily_loss_pct",
            Self::MaxSectorExposurePct => "max_sector_exposure_pct",
            Self::MaxSingleNamePct => "max_single_name_pct",
            Self::MaxOpenOrders => "max_open_orders",
            Self::OrderRateLimit => "order_rate_limit",
            Self::DuplicateWindowSeconds => "duplicate_window_seconds",
            Self::SymbolAllowlist => "symbol_allowlist",
            Self::SymbolBlocklist => "symbol_blocklist",
        }
    }
}

impl std::fmt::Display for RiskParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskParam {
    type Err = RiskError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| RiskError::UnknownParam(s.to_string()))
    }
}

/// A coerced risk-parameter value, per §4.3's `set_limit` contract.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    /// A numeric value, used for all params except the two symbol lists.
    Numeric(Decimal),
    /// An uppercased symbol set.
    Symbols(BTreeSet<String>),
}

impl ParamValue {
    /// Coerce a raw `serde_json::Value` into the type `param` expects.
    pub fn coerce(param: RiskParam, raw: &serde_json::Value) -> Result<Self, RiskError> {
        if param.is_numeric() {
            let decimal = match raw {
                serde_json::Value::Number(n) => n
                    .as_f64()
                    .and_then(|f| Decimal::try_from(f).ok())
                    .or_else(|| n.to_string().parse().ok()),
                serde_json::Value::String(s) => s.parse().ok(),
                _ => None,
            }
            .ok_or_else(|| RiskError::InvalidValue {
                param: param.to_string(),
                reason: format!("expected a number, got {raw}"),
            })?;
            Ok(Self::Numeric(decimal))
        } else {
            let symbols = match raw {
                serde_json::Value::String(s) => s
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_uppercase)
                    .collect(),
                serde_json::Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        serde_json::Value::String(s) => Ok(s.to_uppercase()),
                        other => Err(RiskError::InvalidValue {
                            param: param.to_string(),
                            reason: format!("expected a string in symbol list, got {other}"),
                        }),
                    })
                    .collect::<Result<BTreeSet<String>, RiskError>>()?,
                other => {
                    return Err(RiskError::InvalidValue {
                        param: param.to_string(),
                        reason: format!("expected a string or array of symbols, got {other}"),
                    })
                }
            };
            Ok(Self::Symbols(symbols))
        }
    }

    /// The numeric value, or `None` for a symbol list.
    #[must_use]
    pub fn as_numeric(&self) -> Option<Decimal> {
        match self {
            Self::Numeric(d) => Some(*d),
            Self::Symbols(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parses_every_param_name_round_trip() {
        for param in RiskParam::all() {
            assert_eq!(param.as_str().parse::<RiskParam>().unwrap(), param);
        }
    }

    #[test]
    fn unknown_param_name_is_rejected() {
        assert_eq!(
            "not_a_param".parse::<RiskParam>(),
            Err(RiskError::UnknownParam("not_a_param".to_string()))
        );
    }

    #[test]
    fn coerces_numeric_param_from_json_number() {
        let value = ParamValue::coerce(RiskParam::MaxOrderValue, &json!(5000)).unwrap();
        assert_eq!(value.as_numeric(), Some(dec!(5000)));
    }

    #[test]
    fn coerces_symbol_list_from_comma_separated_string() {
        let value = ParamValue::coerce(RiskParam::SymbolAllowlist, &json!("aapl, msft")).unwrap();
        match value {
            ParamValue::Symbols(symbols) => {
                assert!(symbols.contains("AAPL"));
                assert!(symbols.contains("MSFT"));
            }
            ParamValue::Numeric(_) => panic!("expected symbol set"),
        }
    }

    #[test]
    fn rejects_symbol_list_for_numeric_param() {
        assert!(ParamValue::coerce(RiskParam::MaxOrderValue, &json!("not a number")).is_err());
    }
}
