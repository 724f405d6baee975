//! Configuration loading: an optional TOML file plus `BROKERD_*` environment
//! overrides, read once at startup (§6).

use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};

use monitors::{HeartbeatPolicy, PnlBasis};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Errors raised while resolving `Config`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but isn't valid TOML.
    #[error("failed to parse config file {path}: {source}")]
    Toml {
        /// The file that failed to parse.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: toml::de::Error,
    },
    /// The config file exists but couldn't be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// The file that failed to read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// An environment override or file value failed to parse.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// The dotted field name.
        field: String,
        /// The offending raw value.
        value: String,
    },
}

/// Which broker provider to construct (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// The IB-style primary adapter.
    #[default]
    Ib,
    /// The E*Trade-compatible secondary adapter.
    Etrade,
}

impl ProviderKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "ib" => Some(Self::Ib),
            "etrade" => Some(Self::Etrade),
            _ => None,
        }
    }
}

/// Gateway connection parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway host.
    pub host: String,
    /// Gateway port.
    pub port: u16,
    /// Client id presented at connect time.
    pub client_id: u32,
    /// Whether to auto-reconnect on an unexpected disconnect.
    pub auto_reconnect: bool,
    /// Maximum backoff between reconnect attempts, in seconds.
    pub reconnect_backoff_max: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4001,
            client_id: 1,
            auto_reconnect: true,
            reconnect_backoff_max: 30,
        }
    }
}

/// Risk engine defaults, one-to-one with `risk::RiskConfig` (§3).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfigSection {
    /// Maximum position size as a percentage of NLV.
    pub max_position_pct: Decimal,
    /// Maximum notional value of a single order.
    pub max_order_value: Decimal,
    /// Maximum daily loss as a percentage of NLV.
    pub max_daily_loss_pct: Decimal,
    /// Maximum sector exposure as a percentage of NLV.
    pub max_sector_exposure_pct: Decimal,
    /// Maximum single-name exposure as a percentage of NLV.
    pub max_single_name_pct: Decimal,
    /// Maximum number of simultaneously open orders.
    pub max_open_orders: u32,
    /// Maximum order submissions per rolling 60-second window.
    pub order_rate_limit: u32,
    /// Width of the duplicate-order fingerprint window, in seconds.
    pub duplicate_window_seconds: u64,
    /// Only these uppercased symbols may be traded, when non-empty.
    pub symbol_allowlist: BTreeSet<String>,
    /// Uppercased symbols that may never be traded.
    pub symbol_blocklist: BTreeSet<String>,
    /// Which PnL figure the drawdown breaker watches.
    pub drawdown_pnl_basis: PnlBasisConfig,
}

/// TOML-friendly mirror of `monitors::PnlBasis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PnlBasisConfig {
    /// Realized PnL only.
    Realized,
    /// Unrealized PnL only.
    Unrealized,
    /// Realized plus unrealized.
    #[default]
    Total,
}

impl From<PnlBasisConfig> for PnlBasis {
    fn from(value: PnlBasisConfig) -> Self {
        match value {
            PnlBasisConfig::Realized => Self::Realized,
            PnlBasisConfig::Unrealized => Self::Unrealized,
            PnlBasisConfig::Total => Self::Total,
        }
    }
}

impl Default for RiskConfigSection {
    fn default() -> Self {
        let defaults = risk::RiskConfig::default();
        Self {
            max_position_pct: defaults.max_position_pct,
            max_order_value: defaults.max_order_value,
            max_daily_loss_pct: defaults.max_daily_loss_pct,
            max_sector_exposure_pct: defaults.max_sector_exposure_pct,
            max_single_name_pct: defaults.max_single_name_pct,
            max_open_orders: defaults.max_open_orders,
            order_rate_limit: defaults.order_rate_limit,
            duplicate_window_seconds: defaults.duplicate_window_seconds,
            symbol_allowlist: defaults.symbol_allowlist,
            symbol_blocklist: defaults.symbol_blocklist,
            drawdown_pnl_basis: PnlBasisConfig::default(),
        }
    }
}

impl From<RiskConfigSection> for risk::RiskConfig {
    fn from(section: RiskConfigSection) -> Self {
        Self {
            max_position_pct: section.max_position_pct,
            max_order_value: section.max_order_value,
            max_daily_loss_pct: section.max_daily_loss_pct,
            max_sector_exposure_pct: section.max_sector_exposure_pct,
            max_single_name_pct: section.max_single_name_pct,
            max_open_orders: section.max_open_orders,
            order_rate_limit: section.order_rate_limit,
            duplicate_window_seconds: section.duplicate_window_seconds,
            symbol_allowlist: section.symbol_allowlist,
            symbol_blocklist: section.symbol_blocklist,
        }
    }
}

/// Logging/audit/file locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing-subscriber` env-filter default directive.
    pub level: String,
    /// SQLite audit database path.
    pub audit_db: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            audit_db: default_home().join("audit.db"),
        }
    }
}

/// Heartbeat/keepalive policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Seconds without a `runtime.keepalive` before the monitor reacts.
    pub heartbeat_timeout_seconds: u64,
    /// What happens on a heartbeat timeout.
    pub on_heartbeat_timeout: HeartbeatPolicyConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_seconds: 300,
            on_heartbeat_timeout: HeartbeatPolicyConfig::default(),
        }
    }
}

/// TOML-friendly mirror of `monitors::HeartbeatPolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatPolicyConfig {
    /// Log a risk event but keep trading.
    #[default]
    Warn,
    /// Log a risk event and halt the risk engine.
    Halt,
}

impl From<HeartbeatPolicyConfig> for HeartbeatPolicy {
    fn from(value: HeartbeatPolicyConfig) -> Self {
        match value {
            HeartbeatPolicyConfig::Warn => Self::Warn,
            HeartbeatPolicyConfig::Halt => Self::Halt,
        }
    }
}

/// Market-data defaults (§6).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    /// Default quote intent when a request omits one.
    pub quote_intent_default: String,
    /// Symbols probed at startup to warm the capability cache.
    pub probe_symbols: Vec<String>,
    /// How long a capability probe stays cached, in seconds.
    pub capability_ttl_seconds: u64,
    /// Whether `quote.snapshot` may fall back to a history-derived last price.
    pub allow_history_last_fallback: bool,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            quote_intent_default: "best_effort".to_string(),
            probe_symbols: Vec::new(),
            capability_ttl_seconds: 60,
            allow_history_last_fallback: true,
        }
    }
}

/// Process-level runtime paths and timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Unix socket path.
    pub socket_path: PathBuf,
    /// PID file path.
    pub pid_file: PathBuf,
    /// Per-request timeout, in seconds.
    pub request_timeout_seconds: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_path: default_home().join("broker.sock"),
            pid_file: default_home().join("broker-daemon.pid"),
            request_timeout_seconds: 15,
        }
    }
}

fn default_home() -> PathBuf {
    env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from).join(".broker")
}

/// The full configuration surface (§6), assembled once at startup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which provider adapter to construct.
    pub provider: ProviderKind,
    /// Gateway dial parameters.
    pub gateway: GatewayConfig,
    /// Risk engine defaults.
    pub risk: RiskConfigSection,
    /// Logging and audit locations.
    pub logging: LoggingConfig,
    /// Heartbeat policy.
    pub agent: AgentConfig,
    /// Market-data defaults.
    pub market_data: MarketDataConfig,
    /// Socket/pid/timeout settings.
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Load from `path` (defaulting to `./brokerd.toml` when `None`), then
    /// apply `BROKERD_*` environment overrides. A missing file is not an
    /// error; its absence just means every field keeps its default.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = PathBuf::from("./brokerd.toml");
        let path = path.unwrap_or(&default_path);
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&text).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_var("BROKERD_PROVIDER") {
            self.provider = ProviderKind::parse(&v).ok_or_else(|| invalid("provider", &v))?;
        }
        if let Some(v) = env_var("BROKERD_GATEWAY_HOST") {
            self.gateway.host = v;
        }
        if let Some(v) = env_var("BROKERD_GATEWAY_PORT") {
            self.gateway.port = parse_env(&v, "gateway.port")?;
        }
        if let Some(v) = env_var("BROKERD_GATEWAY_CLIENT_ID") {
            self.gateway.client_id = parse_env(&v, "gateway.client_id")?;
        }
        if let Some(v) = env_var("BROKERD_RISK_MAX_POSITION_PCT") {
            self.risk.max_position_pct = parse_env(&v, "risk.max_position_pct")?;
        }
        if let Some(v) = env_var("BROKERD_RISK_MAX_ORDER_VALUE") {
            self.risk.max_order_value = parse_env(&v, "risk.max_order_value")?;
        }
        if let Some(v) = env_var("BROKERD_RISK_MAX_DAILY_LOSS_PCT") {
            self.risk.max_daily_loss_pct = parse_env(&v, "risk.max_daily_loss_pct")?;
        }
        if let Some(v) = env_var("BROKERD_RISK_MAX_OPEN_ORDERS") {
            self.risk.max_open_orders = parse_env(&v, "risk.max_open_orders")?;
        }
        if let Some(v) = env_var("BROKERD_RISK_ORDER_RATE_LIMIT") {
            self.risk.order_rate_limit = parse_env(&v, "risk.order_rate_limit")?;
        }
        if let Some(v) = env_var("BROKERD_RISK_DRAWDOWN_PNL_BASIS") {
            self.risk.drawdown_pnl_basis = match v.trim().to_lowercase().as_str() {
                "realized" => PnlBasisConfig::Realized,
                "unrealized" => PnlBasisConfig::Unrealized,
                "total" => PnlBasisConfig::Total,
                _ => return Err(invalid("risk.drawdown_pnl_basis", &v)),
            };
        }
        if let Some(v) = env_var("BROKERD_LOGGING_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env_var("BROKERD_LOGGING_AUDIT_DB") {
            self.logging.audit_db = PathBuf::from(v);
        }
        if let Some(v) = env_var("BROKERD_AGENT_HEARTBEAT_TIMEOUT_SECONDS") {
            self.agent.heartbeat_timeout_seconds = parse_env(&v, "agent.heartbeat_timeout_seconds")?;
        }
        if let Some(v) = env_var("BROKERD_AGENT_ON_HEARTBEAT_TIMEOUT") {
            self.agent.on_heartbeat_timeout = match v.trim().to_lowercase().as_str() {
                "warn" => HeartbeatPolicyConfig::Warn,
                "halt" => HeartbeatPolicyConfig::Halt,
                _ => return Err(invalid("agent.on_heartbeat_timeout", &v)),
            };
        }
        if let Some(v) = env_var("BROKERD_RUNTIME_SOCKET_PATH") {
            self.runtime.socket_path = PathBuf::from(v);
        }
        if let Some(v) = env_var("BROKERD_RUNTIME_PID_FILE") {
            self.runtime.pid_file = PathBuf::from(v);
        }
        if let Some(v) = env_var("BROKERD_RUNTIME_REQUEST_TIMEOUT_SECONDS") {
            self.runtime.request_timeout_seconds =
                parse_env(&v, "runtime.request_timeout_seconds")?;
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| invalid(field, raw))
}

fn invalid(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_risk_engine_defaults() {
        let config = Config::default();
        assert_eq!(config.risk.max_open_orders, risk::RiskConfig::default().max_open_orders);
        assert_eq!(config.provider, ProviderKind::Ib);
        assert_eq!(config.runtime.request_timeout_seconds, 15);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/brokerd.toml"))).unwrap();
        assert_eq!(config.gateway.port, 4001);
    }

    #[test]
    fn parses_a_minimal_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brokerd.toml");
        std::fs::write(
            &path,
            "provider = \"etrade\"\n[gateway]\nhost = \"10.0.0.5\"\nport = 7497\n",
        )
        .unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.provider, ProviderKind::Etrade);
        assert_eq!(config.gateway.host, "10.0.0.5");
        assert_eq!(config.gateway.port, 7497);
    }

    #[test]
    fn env_override_wins_over_file_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brokerd.toml");
        std::fs::write(&path, "[gateway]\nport = 7497\n").unwrap();
        env::set_var("BROKERD_GATEWAY_PORT", "9999");
        let config = Config::load(Some(&path)).unwrap();
        env::remove_var("BROKERD_GATEWAY_PORT");
        assert_eq!(config.gateway.port, 9999);
    }
}
