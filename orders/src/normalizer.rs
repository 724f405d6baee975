//! Broker-status normalization (§4.6, §9 open question 1): a default table
//! matching the spec's case-insensitive mapping, extensible per provider for
//! labels like IB's `"Pending Cancel"` that the default table doesn't name.

use model::OrderStatus;

/// Maps a raw broker status string to a normalized `OrderStatus`. Providers
/// with edge-case labels the default table doesn't cover implement their own.
pub trait StatusNormalizer: Send + Sync + std::fmt::Debug {
    /// Normalize `raw` (already trimmed by the caller is not assumed).
    fn normalize(&self, raw: &str) -> OrderStatus;
}

/// §4.6's table, byte for byte: unknown labels default to `Submitted`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStatusNormalizer;

impl StatusNormalizer for DefaultStatusNormalizer {
    fn normalize(&self, raw: &str) -> OrderStatus {
        OrderStatus::normalize_default(raw)
    }
}

/// The default table plus IB's `"Pending Cancel"` label, which the broker
/// reports for an order mid-cancel that hasn't confirmed yet; treated as
/// still-working (`PreSubmitted`) rather than falling through to `Submitted`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IbStatusNormalizer;

impl StatusNormalizer for IbStatusNormalizer {
    fn normalize(&self, raw: &str) -> OrderStatus {
        match raw.trim().to_lowercase().as_str() {
            "pending cancel" => OrderStatus::PreSubmitted,
            other => OrderStatus::normalize_default(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_spec() {
        let n = DefaultStatusNormalizer;
        assert_eq!(n.normalize("filled"), OrderStatus::Filled);
        assert_eq!(n.normalize("API Cancelled"), OrderStatus::Cancelled);
        assert_eq!(n.normalize("something_else"), OrderStatus::Submitted);
    }

    #[test]
    fn ib_table_recognizes_pending_cancel() {
        let n = IbStatusNormalizer;
        assert_eq!(n.normalize("Pending Cancel"), OrderStatus::PreSubmitted);
        assert_eq!(n.normalize("filled"), OrderStatus::Filled);
    }
}
