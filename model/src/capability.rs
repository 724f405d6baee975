use serde::{Deserialize, Serialize};

/// Closed map of named boolean feature flags a broker provider advertises.
/// The dispatcher refuses to route a command whose capability is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capability {
    /// Historical bar queries.
    pub history: bool,
    /// Option chain queries.
    pub option_chain: bool,
    /// Exposure-by-dimension queries.
    pub exposure: bool,
    /// Entry/target/stop bracket orders.
    pub bracket_orders: bool,
    /// Push-style event streaming (order status, fills, disconnects).
    pub streaming: bool,
    /// Cancel-all-open-orders in a single call.
    pub cancel_all: bool,
    /// Session survives process restarts without interactive re-auth.
    pub persistent_auth: bool,
    /// Live (real-time) quote data.
    pub quote_live: bool,
    /// Delayed quote data as a fallback.
    pub quote_delayed: bool,
    /// Delayed-frozen quote data (last known delayed snapshot).
    pub quote_delayed_frozen: bool,
}

impl Capability {
    /// Look up a capability by its wire name, e.g. `"bracket_orders"`.
    #[must_use]
    pub fn supports(&self, name: &str) -> bool {
        match name {
            "history" => self.history,
            "option_chain" => self.option_chain,
            "exposure" => self.exposure,
            "bracket_orders" => self.bracket_orders,
            "streaming" => self.streaming,
            "cancel_all" => self.cancel_all,
            "persistent_auth" => self.persistent_auth,
            "quote_live" => self.quote_live,
            "quote_delayed" => self.quote_delayed,
            "quote_delayed_frozen" => self.quote_delayed_frozen,
            _ => false,
        }
    }

    /// All capabilities enabled. Used by the IB-style primary adapter.
    #[must_use]
    pub fn all() -> Self {
        Self {
            history: true,
            option_chain: true,
            exposure: true,
            bracket_orders: true,
            streaming: true,
            cancel_all: true,
            persistent_auth: true,
            quote_live: true,
            quote_delayed: true,
            quote_delayed_frozen: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_looks_up_by_name() {
        let cap = Capability {
            bracket_orders: false,
            ..Capability::all()
        };
        assert!(cap.supports("history"));
        assert!(!cap.supports("bracket_orders"));
    }

    #[test]
    fn unknown_capability_name_is_false() {
        assert!(!Capability::all().supports("teleportation"));
    }
}
