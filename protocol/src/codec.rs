use crate::error::ProtocolError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode a value to its MessagePack representation, preserving field names
/// as map keys so decode is tolerant of added/reordered/unknown fields (§4.1).
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    let bytes = rmp_serde::to_vec_named(value)?;
    Ok(bytes)
}

/// Decode a MessagePack payload. Unknown map keys are dropped by serde's
/// default struct deserialization; known-but-missing required fields
/// surface as a `ProtocolError::Decode` for the dispatcher to map to
/// `INVALID_ARGS`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let value = rmp_serde::from_slice(bytes)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Request;
    use serde_json::Map;

    #[test]
    fn round_trips_a_request() {
        let req = Request::new("order.place", Map::new());
        let bytes = encode(&req).unwrap();
        let decoded: Request = decode(&bytes).unwrap();
        assert_eq!(decoded.command, req.command);
        assert_eq!(decoded.request_id, req.request_id);
    }

    #[test]
    fn decode_drops_unknown_map_keys() {
        #[derive(serde::Serialize)]
        struct WithExtra {
            command: String,
            unexpected_field: String,
        }
        let bytes = encode(&WithExtra {
            command: "daemon.status".to_string(),
            unexpected_field: "surprise".to_string(),
        })
        .unwrap();
        let decoded: Request = decode(&bytes).unwrap();
        assert_eq!(decoded.command, "daemon.status");
    }
}
