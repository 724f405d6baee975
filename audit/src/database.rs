use crate::error::AuditError;
use crate::models::{CommandRow, ConnectionEventRow, FillRow, OrderRow, RiskEventRow};
use chrono::{DateTime, Utc};
use diesel::connection::SimpleConnection;
use diesel::sql_types::{Nullable, Text};
use diesel::sqlite::SqliteConnection;
use diesel::{sql_query, Connection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use model::{FillRecord, OrderRecord, OrderSide, OrderStatus, OrderType, RiskCheckResult, TimeInForce};
use rust_decimal::Decimal;
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Which audit table `export_csv` should dump (§6's `audit.export`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditTable {
    /// The `orders` table.
    Orders,
    /// The `commands` table.
    Commands,
    /// The `risk_events` table.
    Risk,
}

/// Filters accepted by `fetch_commands` (§4.2).
#[derive(Debug, Clone, Default)]
pub struct CommandFilter {
    /// Restrict to a single caller kind.
    pub source: Option<String>,
    /// Restrict to commands recorded at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Restrict to a single request id.
    pub request_id: Option<String>,
}

/// Filters accepted by `fetch_orders` (§4.2).
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Restrict to a single status.
    pub status: Option<OrderStatus>,
    /// Restrict to orders created at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

/// Append-only audit log. Single-writer; backed by a Diesel SQLite
/// connection shared behind a mutex, matching the teacher's
/// `SqliteDatabase` connection-ownership pattern.
pub struct AuditLog {
    connection: Arc<Mutex<SqliteConnection>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("connection", &"Arc<Mutex<SqliteConnection>>")
            .finish()
    }
}

impl AuditLog {
    /// Open (creating if absent) the audit database at `database_url`,
    /// running any pending migrations.
    pub fn open(database_url: &str) -> Result<Self, AuditError> {
        let mut connection = SqliteConnection::establish(database_url)?;
        Self::configure(&mut connection)?;
        connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| AuditError::Migration(e.to_string()))?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// An in-memory database for tests — never touches the filesystem.
    pub fn new_in_memory() -> Result<Self, AuditError> {
        let mut connection = SqliteConnection::establish(":memory:")?;
        Self::configure(&mut connection)?;
        connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| AuditError::Migration(e.to_string()))?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn configure(connection: &mut SqliteConnection) -> Result<(), AuditError> {
        connection.batch_execute("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SqliteConnection> {
        self.connection.lock().unwrap_or_else(|poisoned| {
            tracing::error!("audit connection mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Record one dispatched command (§4.2). Durably persisted before return.
    pub fn log_command(
        &self,
        source: &str,
        command: &str,
        arguments: &Value,
        result_code: &str,
        request_id: &str,
    ) -> Result<(), AuditError> {
        let arguments_json = serde_json::to_string(arguments)?;
        let mut conn = self.lock();
        sql_query(
            "INSERT INTO commands (ts, source, command, arguments_json, result_code, request_id) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind::<Text, _>(Utc::now().to_rfc3339())
        .bind::<Text, _>(source)
        .bind::<Text, _>(command)
        .bind::<Text, _>(arguments_json)
        .bind::<Text, _>(result_code)
        .bind::<Text, _>(request_id)
        .execute(&mut *conn)?;
        Ok(())
    }

    /// Upsert an order row keyed by `client_order_id` (§4.2, §4.6).
    pub fn upsert_order(&self, record: &OrderRecord) -> Result<(), AuditError> {
        let risk_check_result_json = serde_json::to_string(&record.risk_check_result)?;
        let now = Utc::now().to_rfc3339();
        let mut conn = self.lock();
        sql_query(
            "INSERT INTO orders (client_order_id, broker_order_id, symbol, side, qty, \
             order_type, limit_price, stop_price, tif, status, submitted_at, filled_at, \
             fill_qty, fill_price, commission, risk_check_result_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(client_order_id) DO UPDATE SET \
             broker_order_id = excluded.broker_order_id, \
             status = excluded.status, \
             submitted_at = excluded.submitted_at, \
             filled_at = excluded.filled_at, \
             fill_qty = excluded.fill_qty, \
             fill_price = excluded.fill_price, \
             commission = excluded.commission, \
             risk_check_result_json = excluded.risk_check_result_json, \
             updated_at = excluded.updated_at",
        )
        .bind::<Text, _>(&record.client_order_id)
        .bind::<Nullable<Text>, _>(record.broker_order_id.clone())
        .bind::<Text, _>(&record.symbol)
        .bind::<Text, _>(record.side.to_string())
        .bind::<Text, _>(record.qty.to_string())
        .bind::<Text, _>(record.order_type.to_string())
        .bind::<Nullable<Text>, _>(record.limit.map(|d| d.to_string()))
        .bind::<Nullable<Text>, _>(record.stop.map(|d| d.to_string()))
        .bind::<Text, _>(record.tif.to_string())
        .bind::<Text, _>(record.status.to_string())
        .bind::<Nullable<Text>, _>(record.submitted_at.map(|ts| ts.to_rfc3339()))
        .bind::<Nullable<Text>, _>(record.filled_at.map(|ts| ts.to_rfc3339()))
        .bind::<Text, _>(record.fill_qty.to_string())
        .bind::<Nullable<Text>, _>(record.fill_price.map(|d| d.to_string()))
        .bind::<Text, _>(record.commission.to_string())
        .bind::<Text, _>(risk_check_result_json)
        .bind::<Text, _>(&now)
        .bind::<Text, _>(&now)
        .execute(&mut *conn)?;
        Ok(())
    }

    /// Append a fill, deduplicated by `fill_id` (§4.2, §8). Returns `true`
    /// if a new row was inserted, `false` if the fill was already present.
    pub fn log_fill(&self, fill: &FillRecord) -> Result<bool, AuditError> {
        let mut conn = self.lock();
        let affected = sql_query(
            "INSERT OR IGNORE INTO fills \
             (fill_id, client_order_id, symbol, qty, price, commission, ts, broker_order_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind::<Text, _>(&fill.fill_id)
        .bind::<Text, _>(&fill.client_order_id)
        .bind::<Text, _>(&fill.symbol)
        .bind::<Text, _>(fill.qty.to_string())
        .bind::<Text, _>(fill.price.to_string())
        .bind::<Text, _>(fill.commission.to_string())
        .bind::<Text, _>(fill.timestamp.to_rfc3339())
        .bind::<Nullable<Text>, _>(fill.broker_order_id.clone())
        .execute(&mut *conn)?;
        Ok(affected > 0)
    }

    /// Record a risk-engine administrative event (halt, limit change, ...).
    pub fn log_risk_event(&self, event_type: &str, details: &Value) -> Result<(), AuditError> {
        let details_json = serde_json::to_string(details)?;
        let mut conn = self.lock();
        sql_query("INSERT INTO risk_events (ts, event_type, details_json) VALUES (?, ?, ?)")
            .bind::<Text, _>(Utc::now().to_rfc3339())
            .bind::<Text, _>(event_type)
            .bind::<Text, _>(details_json)
            .execute(&mut *conn)?;
        Ok(())
    }

    /// Record a provider connection-lifecycle event.
    pub fn log_connection_event(&self, event: &str, details: &Value) -> Result<(), AuditError> {
        let details_json = serde_json::to_string(details)?;
        let mut conn = self.lock();
        sql_query("INSERT INTO connection_events (ts, event, details_json) VALUES (?, ?, ?)")
            .bind::<Text, _>(Utc::now().to_rfc3339())
            .bind::<Text, _>(event)
            .bind::<Text, _>(details_json)
            .execute(&mut *conn)?;
        Ok(())
    }

    /// Filtered read over `commands` (§4.2). Each filter clause uses the
    /// `(? IS NULL OR col = ?)` idiom so the query shape (and therefore its
    /// bind types) never depends on which filters are set.
    pub fn fetch_commands(&self, filter: &CommandFilter) -> Result<Vec<CommandRow>, AuditError> {
        let since = filter.since.map(|ts| ts.to_rfc3339());
        let mut conn = self.lock();
        Ok(sql_query(
            "SELECT * FROM commands \
             WHERE (?1 IS NULL OR source = ?1) \
             AND (?2 IS NULL OR ts >= ?2) \
             AND (?3 IS NULL OR request_id = ?3) \
             ORDER BY id ASC",
        )
        .bind::<Nullable<Text>, _>(filter.source.clone())
        .bind::<Nullable<Text>, _>(since)
        .bind::<Nullable<Text>, _>(filter.request_id.clone())
        .load::<CommandRow>(&mut *conn)?)
    }

    /// Filtered read over `orders`, decoded back into domain records (§4.2).
    pub fn fetch_orders(&self, filter: &OrderFilter) -> Result<Vec<OrderRecord>, AuditError> {
        let status = filter.status.map(|s| s.to_string());
        let since = filter.since.map(|ts| ts.to_rfc3339());
        let rows = {
            let mut conn = self.lock();
            sql_query(
                "SELECT * FROM orders \
                 WHERE (?1 IS NULL OR status = ?1) \
                 AND (?2 IS NULL OR created_at >= ?2) \
                 ORDER BY created_at ASC",
            )
            .bind::<Nullable<Text>, _>(status)
            .bind::<Nullable<Text>, _>(since)
            .load::<OrderRow>(&mut *conn)?
        };
        rows.into_iter().map(order_row_to_record).collect()
    }

    /// Fills for a symbol (or all symbols when `symbol` is `None`), decoded
    /// back into domain records.
    pub fn fetch_fills(&self, symbol: Option<&str>) -> Result<Vec<FillRecord>, AuditError> {
        let symbol = symbol.map(str::to_uppercase);
        let rows = {
            let mut conn = self.lock();
            sql_query(
                "SELECT * FROM fills WHERE (?1 IS NULL OR symbol = ?1) ORDER BY ts ASC",
            )
            .bind::<Nullable<Text>, _>(symbol)
            .load::<FillRow>(&mut *conn)?
        };
        rows.into_iter().map(fill_row_to_record).collect()
    }

    /// Risk events, optionally filtered by type.
    pub fn fetch_risk_events(
        &self,
        event_type: Option<&str>,
    ) -> Result<Vec<RiskEventRow>, AuditError> {
        let event_type = event_type.map(str::to_string);
        let mut conn = self.lock();
        Ok(sql_query(
            "SELECT * FROM risk_events WHERE (?1 IS NULL OR event_type = ?1) ORDER BY id ASC",
        )
        .bind::<Nullable<Text>, _>(event_type)
        .load::<RiskEventRow>(&mut *conn)?)
    }

    /// All connection events, oldest first.
    pub fn fetch_connection_events(&self) -> Result<Vec<ConnectionEventRow>, AuditError> {
        let mut conn = self.lock();
        Ok(
            sql_query("SELECT * FROM connection_events ORDER BY id ASC")
                .load::<ConnectionEventRow>(&mut *conn)?,
        )
    }

    /// Write a CSV export of `table` to `path`, header first, atomically
    /// (written to a sibling temp file, then renamed into place).
    pub fn export_csv(&self, table: AuditTable, path: &Path) -> Result<usize, AuditError> {
        let (header, rows) = match table {
            AuditTable::Commands => {
                let rows = self.fetch_commands(&CommandFilter::default())?;
                let header = "id,ts,source,command,arguments_json,result_code,request_id".to_string();
                let lines = rows
                    .iter()
                    .map(|r| {
                        csv_line(&[
                            &r.id.to_string(),
                            &r.ts,
                            &r.source,
                            &r.command,
                            &r.arguments_json,
                            &r.result_code,
                            &r.request_id,
                        ])
                    })
                    .collect::<Vec<_>>();
                (header, lines)
            }
            AuditTable::Orders => {
                let mut conn_rows = {
                    let mut conn = self.lock();
                    sql_query("SELECT * FROM orders ORDER BY created_at ASC").load::<OrderRow>(&mut *conn)?
                };
                conn_rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
                let header = "client_order_id,broker_order_id,symbol,side,qty,order_type,\
                    limit_price,stop_price,tif,status,submitted_at,filled_at,fill_qty,\
                    fill_price,commission,created_at,updated_at"
                    .to_string();
                let lines = conn_rows
                    .iter()
                    .map(|r| {
                        csv_line(&[
                            &r.client_order_id,
                            r.broker_order_id.as_deref().unwrap_or(""),
                            &r.symbol,
                            &r.side,
                            &r.qty,
                            &r.order_type,
                            r.limit_price.as_deref().unwrap_or(""),
                            r.stop_price.as_deref().unwrap_or(""),
                            &r.tif,
                            &r.status,
                            r.submitted_at.as_deref().unwrap_or(""),
                            r.filled_at.as_deref().unwrap_or(""),
                            &r.fill_qty,
                            r.fill_price.as_deref().unwrap_or(""),
                            &r.commission,
                            &r.created_at,
                            &r.updated_at,
                        ])
                    })
                    .collect::<Vec<_>>();
                (header, lines)
            }
            AuditTable::Risk => {
                let rows = self.fetch_risk_events(None)?;
                let header = "id,ts,event_type,details_json".to_string();
                let lines = rows
                    .iter()
                    .map(|r| csv_line(&[&r.id.to_string(), &r.ts, &r.event_type, &r.details_json]))
                    .collect::<Vec<_>>();
                (header, lines)
            }
        };

        let row_count = rows.len();
        let mut contents = header;
        contents.push('\n');
        for line in rows {
            contents.push_str(&line);
            contents.push('\n');
        }

        let tmp_path = path.with_extension("csv.tmp");
        std::fs::write(&tmp_path, contents)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(row_count)
    }
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_line(fields: &[&str]) -> String {
    fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",")
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, AuditError> {
    Decimal::from_str(value).map_err(|_| AuditError::InvalidDecimal(format!("{field}={value}")))
}

fn parse_ts(field: &str, value: &str) -> Result<DateTime<Utc>, AuditError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AuditError::InvalidTimestamp(format!("{field}={value}")))
}

fn order_row_to_record(row: OrderRow) -> Result<OrderRecord, AuditError> {
    let risk_check_result: RiskCheckResult = serde_json::from_str(&row.risk_check_result_json)?;
    Ok(OrderRecord {
        client_order_id: row.client_order_id,
        broker_order_id: row.broker_order_id,
        symbol: row.symbol,
        side: OrderSide::from_str(&row.side)
            .map_err(|e| AuditError::InvalidEnumValue(e.to_string()))?,
        qty: parse_decimal("qty", &row.qty)?,
        order_type: parse_order_type(&row.order_type)?,
        limit: row
            .limit_price
            .as_deref()
            .map(|v| parse_decimal("limit_price", v))
            .transpose()?,
        stop: row
            .stop_price
            .as_deref()
            .map(|v| parse_decimal("stop_price", v))
            .transpose()?,
        tif: TimeInForce::from_str(&row.tif)
            .map_err(|e| AuditError::InvalidEnumValue(e.to_string()))?,
        status: OrderStatus::from_str(&row.status)
            .map_err(|e| AuditError::InvalidEnumValue(e.to_string()))?,
        submitted_at: row
            .submitted_at
            .as_deref()
            .map(|v| parse_ts("submitted_at", v))
            .transpose()?,
        filled_at: row
            .filled_at
            .as_deref()
            .map(|v| parse_ts("filled_at", v))
            .transpose()?,
        fill_qty: parse_decimal("fill_qty", &row.fill_qty)?,
        fill_price: row
            .fill_price
            .as_deref()
            .map(|v| parse_decimal("fill_price", v))
            .transpose()?,
        commission: parse_decimal("commission", &row.commission)?,
        risk_check_result,
    })
}

fn parse_order_type(raw: &str) -> Result<OrderType, AuditError> {
    match raw {
        "market" => Ok(OrderType::Market),
        "limit" => Ok(OrderType::Limit),
        "stop" => Ok(OrderType::Stop),
        "stop_limit" => Ok(OrderType::StopLimit),
        other => Err(AuditError::InvalidEnumValue(other.to_string())),
    }
}

fn fill_row_to_record(row: FillRow) -> Result<FillRecord, AuditError> {
    Ok(FillRecord {
        fill_id: row.fill_id,
        client_order_id: row.client_order_id,
        broker_order_id: row.broker_order_id,
        symbol: row.symbol,
        qty: parse_decimal("qty", &row.qty)?,
        price: parse_decimal("price", &row.price)?,
        commission: parse_decimal("commission", &row.commission)?,
        timestamp: parse_ts("ts", &row.ts)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use model::{OrderSide as Side, RiskCheckResult as RCR, TimeInForce as Tif};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn sample_order(client_order_id: &str) -> OrderRecord {
        OrderRecord {
            client_order_id: client_order_id.to_string(),
            broker_order_id: None,
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            qty: dec!(10),
            order_type: OrderType::Market,
            limit: None,
            stop: None,
            tif: Tif::Day,
            status: OrderStatus::PendingSubmit,
            submitted_at: None,
            filled_at: None,
            fill_qty: Decimal::ZERO,
            fill_price: None,
            commission: Decimal::ZERO,
            risk_check_result: RCR::pass(),
        }
    }

    #[test]
    fn logs_and_fetches_commands() {
        let log = AuditLog::new_in_memory().unwrap();
        log.log_command("cli", "order.place", &json!({"symbol": "AAPL"}), "OK", "req-1")
            .unwrap();
        let rows = log.fetch_commands(&CommandFilter::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].command, "order.place");
        assert_eq!(rows[0].arguments_json, "{\"symbol\":\"AAPL\"}");
    }

    #[test]
    fn filters_commands_by_source() {
        let log = AuditLog::new_in_memory().unwrap();
        log.log_command("cli", "order.place", &json!({}), "OK", "req-1").unwrap();
        log.log_command("sdk", "order.place", &json!({}), "OK", "req-2").unwrap();
        let filter = CommandFilter {
            source: Some("sdk".to_string()),
            ..Default::default()
        };
        let rows = log.fetch_commands(&filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].request_id, "req-2");
    }

    #[test]
    fn upserts_order_by_client_order_id() {
        let log = AuditLog::new_in_memory().unwrap();
        let mut order = sample_order("COID-1");
        log.upsert_order(&order).unwrap();
        order.status = OrderStatus::Filled;
        order.fill_qty = dec!(10);
        order.fill_price = Some(dec!(179.95));
        log.upsert_order(&order).unwrap();

        let rows = log.fetch_orders(&OrderFilter::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, OrderStatus::Filled);
        assert_eq!(rows[0].fill_price, Some(dec!(179.95)));
    }

    #[test]
    fn fill_is_deduplicated_by_fill_id() {
        let log = AuditLog::new_in_memory().unwrap();
        let fill = FillRecord {
            fill_id: "FILL-1".to_string(),
            client_order_id: "COID-1".to_string(),
            broker_order_id: None,
            symbol: "AAPL".to_string(),
            qty: dec!(10),
            price: dec!(179.95),
            commission: dec!(0.5),
            timestamp: Utc::now(),
        };
        assert!(log.log_fill(&fill).unwrap());
        assert!(!log.log_fill(&fill).unwrap());
        assert_eq!(log.fetch_fills(None).unwrap().len(), 1);
    }

    #[test]
    fn risk_events_filtered_by_type() {
        let log = AuditLog::new_in_memory().unwrap();
        log.log_risk_event("halted", &json!({"reason": "manual"})).unwrap();
        log.log_risk_event("limit_set", &json!({"param": "max_order_value"}))
            .unwrap();
        let rows = log.fetch_risk_events(Some("halted")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_type, "halted");
    }

    #[test]
    fn connection_events_accumulate_in_order() {
        let log = AuditLog::new_in_memory().unwrap();
        log.log_connection_event("connected", &json!({})).unwrap();
        log.log_connection_event("disconnected", &json!({"reason": "timeout"}))
            .unwrap();
        let rows = log.fetch_connection_events().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event, "connected");
        assert_eq!(rows[1].event, "disconnected");
    }

    #[test]
    fn export_csv_writes_header_and_rows() {
        let log = AuditLog::new_in_memory().unwrap();
        log.log_command("cli", "order.place", &json!({}), "OK", "req-1").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.csv");
        let rows = log.export_csv(AuditTable::Commands, &path).unwrap();
        assert_eq!(rows, 1);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("id,ts,source,command,arguments_json,result_code,request_id"));
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn fetch_commands_respects_since_filter() {
        let log = AuditLog::new_in_memory().unwrap();
        log.log_command("cli", "order.place", &json!({}), "OK", "req-1").unwrap();
        let future = Utc::now() + Duration::seconds(3600);
        let filter = CommandFilter {
            since: Some(future),
            ..Default::default()
        };
        assert!(log.fetch_commands(&filter).unwrap().is_empty());
    }
}
