use model::{BrokerError, Topic};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

fn new_request_id() -> Uuid {
    Uuid::new_v4()
}

fn default_true() -> bool {
    true
}

/// A request frame sent by a client (§4.1, §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    /// Client-generated id, echoed in the response.
    #[serde(default = "new_request_id")]
    pub request_id: Uuid,
    /// Command name, e.g. `"order.place"`.
    pub command: String,
    /// Named parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Whether this request opens a long-lived event subscription.
    #[serde(default)]
    pub stream: bool,
    /// Caller kind, e.g. `"cli"` or `"sdk"` — carried into `audit.commands`.
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "cli".to_string()
}

impl Request {
    /// Build a request with a freshly generated id and `source="cli"`.
    #[must_use]
    pub fn new(command: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            request_id: new_request_id(),
            command: command.into(),
            params,
            stream: false,
            source: default_source(),
        }
    }
}

/// A structured error, mirroring §7's taxonomy on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable error code string.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured details, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// One-line actionable suggestion, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl From<&BrokerError> for ErrorPayload {
    fn from(err: &BrokerError) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
            details: err.details.clone(),
            suggestion: err.suggestion.clone(),
        }
    }
}

/// A response frame: either `data` on success or a structured `error` (§4.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    /// Echoes the request's id.
    pub request_id: Uuid,
    /// Whether the request succeeded.
    pub ok: bool,
    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Structured error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Response {
    /// Build a success response.
    #[must_use]
    pub fn ok(request_id: Uuid, data: Value) -> Self {
        Self {
            request_id,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Build a failure response from a `BrokerError`.
    #[must_use]
    pub fn err(request_id: Uuid, error: &BrokerError) -> Self {
        Self {
            request_id,
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// A pushed event frame for a subscribed stream (§4.1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The subscribe request this event stream belongs to, if tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    /// Which broadcast channel this event belongs to.
    pub topic: Topic,
    /// Event-specific payload.
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::ErrorCode;

    #[test]
    fn request_defaults_stream_false_and_source_cli() {
        let req = Request::new("daemon.status", Map::new());
        assert!(!req.stream);
        assert_eq!(req.source, "cli");
    }

    #[test]
    fn response_err_carries_code_as_wire_string() {
        let broker_err = BrokerError::new(ErrorCode::RiskHalted, "trading is halted");
        let resp = Response::err(Uuid::new_v4(), &broker_err);
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().code, "RISK_HALTED");
    }

    #[test]
    fn request_missing_optional_fields_deserializes_with_defaults() {
        let json = serde_json::json!({"command": "daemon.status"});
        let req: Request = serde_json::from_value(json).unwrap();
        assert_eq!(req.command, "daemon.status");
        assert!(req.params.is_empty());
        assert!(!req.stream);
    }
}
