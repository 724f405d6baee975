//! Unix socket accept loop: one task per connection, framed MessagePack
//! request/response, with `events.subscribe` handled outside the generic
//! dispatcher so the connection can be held open for streaming (§4.1, §4.7).

use crate::broadcaster::Broadcaster;
use crate::dispatcher::Dispatcher;
use audit::AuditLog;
use model::{BrokerError, ErrorCode, Event, Topic};
use protocol::{decode, encode, read_framed, write_framed, EventEnvelope, ProtocolError, Request, Response};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use uuid::Uuid;

/// Owns the listening socket and hands each accepted connection to
/// [`handle_connection`] on its own task.
#[derive(Debug)]
pub struct Server {
    listener: UnixListener,
    dispatcher: Arc<Dispatcher>,
    broadcaster: Arc<Broadcaster>,
    audit: Arc<AuditLog>,
}

impl Server {
    /// Wrap an already-bound listener with the shared dispatch state.
    #[must_use]
    pub fn new(
        listener: UnixListener,
        dispatcher: Arc<Dispatcher>,
        broadcaster: Arc<Broadcaster>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self { listener, dispatcher, broadcaster, audit }
    }

    /// Accept connections until `shutdown` resolves, spawning one task per
    /// connection. Each connection is independent; a panic or error in one
    /// never brings down the accept loop.
    pub async fn serve(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let dispatcher = Arc::clone(&self.dispatcher);
                            let broadcaster = Arc::clone(&self.broadcaster);
                            let audit = Arc::clone(&self.audit);
                            tokio::spawn(async move {
                                handle_connection(stream, dispatcher, broadcaster, audit).await;
                            });
                        }
                        Err(err) => {
                            tracing::warn!(%err, "failed to accept connection");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_connection<S>(
    mut stream: S,
    dispatcher: Arc<Dispatcher>,
    broadcaster: Arc<Broadcaster>,
    audit: Arc<AuditLog>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let payload = match read_framed(&mut stream).await {
            Ok(payload) => payload,
            Err(ProtocolError::Io(_)) => return,
            Err(err) => {
                tracing::debug!(%err, "malformed frame, closing connection");
                return;
            }
        };

        let request: Request = match decode(&payload) {
            Ok(req) => req,
            Err(err) => {
                let fallback_id = Uuid::new_v4();
                let broker_err = BrokerError::new(ErrorCode::InvalidArgs, format!("malformed request: {err}"));
                if send_response(&mut stream, fallback_id, Err(&broker_err)).await.is_err() {
                    return;
                }
                continue;
            }
        };

        if request.command == "events.subscribe" {
            if !request.stream {
                let err = BrokerError::new(
                    ErrorCode::InvalidArgs,
                    "events.subscribe requires the request's stream flag to be set",
                );
                log_command(&audit, &request, Err(&err));
                if send_response(&mut stream, request.request_id, Err(&err)).await.is_err() {
                    return;
                }
                continue;
            }
            match subscribe_and_stream(&mut stream, &request, &broadcaster).await {
                Ok(()) => {
                    log_command(&audit, &request, Ok(()));
                }
                Err(err) => {
                    log_command(&audit, &request, Err(&err));
                    let _ = send_response(&mut stream, request.request_id, Err(&err)).await;
                }
            }
            return;
        }

        let result = dispatcher.dispatch(&request.command, &request.params).await;
        log_command(&audit, &request, result.as_ref().map(|_| ()));
        let sent = match &result {
            Ok(data) => send_response(&mut stream, request.request_id, Ok(data.clone())).await,
            Err(err) => send_response(&mut stream, request.request_id, Err(err)).await,
        };
        if sent.is_err() {
            return;
        }
    }
}

/// Parse `topics`, register with the broadcaster, ack, then forward every
/// matching event until the connection closes or the channel is dropped.
async fn subscribe_and_stream<S>(
    stream: &mut S,
    request: &Request,
    broadcaster: &Broadcaster,
) -> Result<(), BrokerError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let raw_topics = request
        .params
        .get("topics")
        .and_then(|v| v.as_array())
        .ok_or_else(|| BrokerError::new(ErrorCode::InvalidArgs, "missing required parameter: topics"))?;

    let mut topics = BTreeSet::new();
    for raw in raw_topics {
        let name = raw
            .as_str()
            .ok_or_else(|| BrokerError::new(ErrorCode::InvalidArgs, "expected an array of topic strings"))?;
        let topic = Topic::from_str(name)
            .map_err(|_| BrokerError::new(ErrorCode::InvalidArgs, format!("unknown topic: {name}")))?;
        topics.insert(topic);
    }
    if topics.is_empty() {
        return Err(BrokerError::new(ErrorCode::InvalidArgs, "topics must not be empty"));
    }

    let (id, mut rx) = broadcaster.subscribe(topics.clone());
    let subscribed: Vec<String> = topics.iter().map(ToString::to_string).collect();
    let ack = Response::ok(request.request_id, serde_json::json!({ "subscribed": subscribed }));
    let ack_bytes = encode(&ack).map_err(encode_err)?;
    if write_framed(stream, &ack_bytes).await.is_err() {
        broadcaster.unsubscribe(id);
        return Ok(());
    }

    while let Some(event) = rx.recv().await {
        if forward_event(stream, request.request_id, &event).await.is_err() {
            break;
        }
    }
    broadcaster.unsubscribe(id);
    Ok(())
}

async fn forward_event<S>(stream: &mut S, request_id: Uuid, event: &Event) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    let envelope = EventEnvelope {
        request_id: Some(request_id),
        topic: event.topic,
        data: event.payload.clone(),
    };
    let bytes = encode(&envelope)?;
    write_framed(stream, &bytes).await
}

async fn send_response<S>(
    stream: &mut S,
    request_id: Uuid,
    result: Result<serde_json::Value, &BrokerError>,
) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
{
    let response = match result {
        Ok(data) => Response::ok(request_id, data),
        Err(err) => Response::err(request_id, err),
    };
    let bytes = encode(&response)?;
    write_framed(stream, &bytes).await
}

fn log_command(audit: &AuditLog, request: &Request, result: Result<(), &BrokerError>) {
    let result_code = match result {
        Ok(()) => "OK",
        Err(err) => err.code.as_str(),
    };
    if let Err(err) = audit.log_command(
        &request.source,
        &request.command,
        &serde_json::Value::Object(request.params.clone()),
        result_code,
        &request.request_id.to_string(),
    ) {
        tracing::error!(%err, command = %request.command, "failed to record command audit entry");
    }
}

fn encode_err(err: ProtocolError) -> BrokerError {
    BrokerError::new(ErrorCode::InternalError, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;
    use audit::AuditLog;
    use broker::PaperProvider;
    use market_data::MarketDataService;
    use monitors::{HeartbeatPolicy, MonitorSupervisor, PnlBasis};
    use orders::OrderManager;
    use risk::{RiskConfig, RiskEngine};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tokio::io::duplex;

    fn test_dispatcher() -> Arc<Dispatcher> {
        let provider: Arc<dyn model::BrokerProvider> = Arc::new(PaperProvider::new());
        let risk = Arc::new(Mutex::new(RiskEngine::new(RiskConfig::default())));
        let audit = Arc::new(AuditLog::new_in_memory().expect("in-memory audit"));
        let (tx, _rx) = tokio::sync::broadcast::channel(64);
        let market_data = Arc::new(MarketDataService::new(Arc::clone(&provider)));
        let orders = Arc::new(OrderManager::new(
            Arc::clone(&provider),
            Arc::clone(&risk),
            Arc::clone(&audit),
            tx.clone(),
        ));
        let monitors = Arc::new(MonitorSupervisor::new(
            Arc::clone(&provider),
            Arc::clone(&risk),
            Arc::clone(&audit),
            tx,
            std::time::Duration::from_secs(30),
            HeartbeatPolicy::Warn,
            PnlBasis::Total,
        ));
        let (shutdown_tx, _shutdown_rx) = tokio::sync::watch::channel(false);
        Arc::new(Dispatcher::new(
            provider,
            market_data,
            orders,
            risk,
            audit,
            monitors,
            PathBuf::from("/tmp/test.sock"),
            shutdown_tx,
        ))
    }

    #[tokio::test]
    async fn round_trips_a_simple_request() {
        let dispatcher = test_dispatcher();
        let broadcaster = Arc::new(Broadcaster::new());
        let audit = Arc::new(AuditLog::new_in_memory().expect("in-memory audit"));
        let (mut client, server_side) = duplex(4096);

        tokio::spawn(handle_connection(server_side, dispatcher, broadcaster, audit));

        let request = Request::new("daemon.status", Default::default());
        let bytes = encode(&request).unwrap();
        write_framed(&mut client, &bytes).await.unwrap();
        let resp_bytes = read_framed(&mut client).await.unwrap();
        let response: Response = protocol::decode(&resp_bytes).unwrap();
        assert!(response.ok);
    }

    #[tokio::test]
    async fn unknown_command_gets_invalid_args_with_a_suggestion() {
        let dispatcher = test_dispatcher();
        let broadcaster = Arc::new(Broadcaster::new());
        let audit = Arc::new(AuditLog::new_in_memory().expect("in-memory audit"));
        let (mut client, server_side) = duplex(4096);

        tokio::spawn(handle_connection(server_side, dispatcher, broadcaster, audit));

        let request = Request::new("daemon.stats", Default::default());
        let bytes = encode(&request).unwrap();
        write_framed(&mut client, &bytes).await.unwrap();
        let resp_bytes = read_framed(&mut client).await.unwrap();
        let response: Response = protocol::decode(&resp_bytes).unwrap();
        assert!(!response.ok);
        let error = response.error.unwrap();
        assert_eq!(error.code, "INVALID_ARGS");
        assert!(error.suggestion.is_some());
    }

    #[tokio::test]
    async fn events_subscribe_streams_until_the_connection_closes() {
        let dispatcher = test_dispatcher();
        let broadcaster = Arc::new(Broadcaster::new());
        let audit = Arc::new(AuditLog::new_in_memory().expect("in-memory audit"));
        let (mut client, server_side) = duplex(8192);

        tokio::spawn(handle_connection(server_side, dispatcher, Arc::clone(&broadcaster), audit));

        let mut params = serde_json::Map::new();
        params.insert("topics".to_string(), serde_json::json!(["risk"]));
        let mut request = Request::new("events.subscribe", params);
        request.stream = true;
        let bytes = encode(&request).unwrap();
        write_framed(&mut client, &bytes).await.unwrap();

        let ack_bytes = read_framed(&mut client).await.unwrap();
        let ack: Response = protocol::decode(&ack_bytes).unwrap();
        assert!(ack.ok);

        // Give the subscribe loop a moment to register before dispatching.
        tokio::task::yield_now().await;
        broadcaster.dispatch(&Event::new(Topic::Risk, serde_json::json!({"halted": true})));

        let event_bytes = read_framed(&mut client).await.unwrap();
        let envelope: EventEnvelope = protocol::decode(&event_bytes).unwrap();
        assert_eq!(envelope.topic, Topic::Risk);
    }

    #[test]
    fn params_helpers_are_reachable_from_this_module() {
        let map = serde_json::Map::new();
        assert!(params::string_opt(&map, "anything").unwrap().is_none());
    }
}
