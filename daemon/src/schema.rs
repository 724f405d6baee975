//! `schema.get` (§6): a static descriptor of every command's parameters,
//! so a client can discover the wire contract without reading source.

use crate::dispatcher::COMMANDS;
use serde_json::{json, Value};

struct Descriptor {
    command: &'static str,
    summary: &'static str,
    params: &'static [(&'static str, &'static str)],
}

const DESCRIPTORS: &[Descriptor] = &[
    Descriptor { command: "daemon.status", summary: "Uptime, connection state, and risk-halt status.", params: &[] },
    Descriptor { command: "daemon.stop", summary: "Request an orderly shutdown.", params: &[] },
    Descriptor {
        command: "quote.snapshot",
        summary: "Latest quotes for a symbol list.",
        params: &[("symbols", "string[]"), ("force", "bool?"), ("intent", "string?")],
    },
    Descriptor {
        command: "market.capabilities",
        summary: "Per-symbol field availability.",
        params: &[("symbols", "string[]?"), ("refresh", "bool?")],
    },
    Descriptor {
        command: "market.history",
        summary: "Historical bars for one symbol.",
        params: &[("symbol", "string"), ("period", "string"), ("bar", "string"), ("rth_only", "bool?"), ("strict", "bool?")],
    },
    Descriptor {
        command: "market.chain",
        summary: "Option chain for one underlying.",
        params: &[
            ("symbol", "string"),
            ("expiry", "string?"),
            ("strike_range", "string?"),
            ("type", "string?"),
            ("limit", "integer?"),
            ("offset", "integer?"),
            ("fields", "string[]?"),
            ("strict", "bool?"),
        ],
    },
    Descriptor {
        command: "portfolio.positions",
        summary: "Current positions, optionally filtered to one symbol.",
        params: &[("symbol", "string?")],
    },
    Descriptor { command: "portfolio.balance", summary: "Net liquidation value.", params: &[] },
    Descriptor { command: "portfolio.pnl", summary: "Daily profit and loss.", params: &[] },
    Descriptor {
        command: "portfolio.exposure",
        summary: "Exposure grouped by a dimension.",
        params: &[("by", "string")],
    },
    Descriptor {
        command: "portfolio.snapshot",
        summary: "Combined quotes, positions, balance, pnl, exposure, and connection state.",
        params: &[("symbols", "string[]?"), ("intent", "string?"), ("force", "bool?"), ("exposure_by", "string?")],
    },
    Descriptor {
        command: "order.place",
        summary: "Submit (or dry-run) a single order.",
        params: &[
            ("side", "string"),
            ("symbol", "string"),
            ("qty", "decimal"),
            ("limit", "decimal?"),
            ("stop", "decimal?"),
            ("tif", "string?"),
            ("client_order_id", "string?"),
            ("dry_run", "bool?"),
        ],
    },
    Descriptor {
        command: "order.bracket",
        summary: "Submit an entry/target/stop bracket.",
        params: &[
            ("side", "string"),
            ("symbol", "string"),
            ("qty", "decimal"),
            ("entry", "decimal"),
            ("tp", "decimal"),
            ("sl", "decimal"),
            ("tif", "string?"),
        ],
    },
    Descriptor { command: "order.status", summary: "Lookup one order by id.", params: &[("order_id", "string")] },
    Descriptor {
        command: "orders.list",
        summary: "Local order records, filtered by status and timestamp.",
        params: &[("status", "string?"), ("since", "string?")],
    },
    Descriptor { command: "order.cancel", summary: "Cancel a single order.", params: &[("order_id", "string")] },
    Descriptor {
        command: "orders.cancel_all",
        summary: "Cancel every open order. Requires explicit confirmation.",
        params: &[("confirm", "bool"), ("json_mode", "bool?")],
    },
    Descriptor {
        command: "fills.list",
        summary: "Recorded fills, filtered by symbol and timestamp.",
        params: &[("symbol", "string?"), ("since", "string?")],
    },
    Descriptor {
        command: "risk.check",
        summary: "Preview the risk result for a hypothetical order.",
        params: &[("side", "string"), ("symbol", "string"), ("qty", "decimal"), ("limit", "decimal?"), ("stop", "decimal?")],
    },
    Descriptor { command: "risk.limits", summary: "Current risk limit configuration.", params: &[] },
    Descriptor {
        command: "risk.set",
        summary: "Permanently change a risk limit.",
        params: &[("param", "string"), ("value", "any")],
    },
    Descriptor { command: "risk.halt", summary: "Halt order submission.", params: &[] },
    Descriptor { command: "risk.resume", summary: "Resume order submission.", params: &[] },
    Descriptor {
        command: "risk.override",
        summary: "Apply a time-bounded override to one risk limit.",
        params: &[("param", "string"), ("value", "any"), ("duration", "integer|string"), ("reason", "string")],
    },
    Descriptor {
        command: "runtime.keepalive",
        summary: "Client heartbeat; resets the idle-disconnect timer.",
        params: &[("sent_at", "string?")],
    },
    Descriptor {
        command: "events.subscribe",
        summary: "Stream events for the given topics until the connection closes.",
        params: &[("topics", "string[]")],
    },
    Descriptor {
        command: "audit.commands",
        summary: "Audit log of dispatched commands.",
        params: &[("source", "string?"), ("since", "string?"), ("request_id", "string?")],
    },
    Descriptor {
        command: "audit.orders",
        summary: "Audit log of order records.",
        params: &[("status", "string?"), ("since", "string?")],
    },
    Descriptor {
        command: "audit.risk",
        summary: "Audit log of risk administrative events.",
        params: &[("event_type", "string?")],
    },
    Descriptor {
        command: "audit.export",
        summary: "Export one audit table to a CSV file.",
        params: &[("table", "string"), ("output", "string"), ("format", "string?")],
    },
    Descriptor {
        command: "schema.get",
        summary: "Describe one command, or list every command.",
        params: &[("command", "string?")],
    },
];

/// Describe `command`, or every command when `command` is `None`.
#[must_use]
pub fn describe(command: Option<&str>) -> Value {
    match command {
        Some(name) => match DESCRIPTORS.iter().find(|d| d.command == name) {
            Some(d) => descriptor_to_json(d),
            None => json!({ "commands": COMMANDS }),
        },
        None => json!({ "commands": DESCRIPTORS.iter().map(descriptor_to_json).collect::<Vec<_>>() }),
    }
}

fn descriptor_to_json(d: &Descriptor) -> Value {
    json!({
        "command": d.command,
        "summary": d.summary,
        "params": d.params.iter().map(|(name, ty)| json!({ "name": name, "type": ty })).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_dispatchable_command_has_a_descriptor() {
        for command in COMMANDS {
            assert!(
                DESCRIPTORS.iter().any(|d| &d.command == command),
                "missing schema descriptor for {command}"
            );
        }
    }

    #[test]
    fn describe_one_command_returns_its_params() {
        let value = describe(Some("order.place"));
        assert_eq!(value["command"], "order.place");
        assert!(value["params"].as_array().unwrap().iter().any(|p| p["name"] == "symbol"));
    }

    #[test]
    fn describe_none_lists_every_command() {
        let value = describe(None);
        assert_eq!(value["commands"].as_array().unwrap().len(), DESCRIPTORS.len());
    }
}
