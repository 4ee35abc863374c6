use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Metric;

/// The ordered metric list handed to the wire codec, together with the
/// per-message sequence number and publish timestamp.
///
/// `seq` is `None` only for node death payloads; every birth, data and
/// device death message carries one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub seq: Option<u64>,
    pub timestamp: u64,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("payload encoding failed: {0}")]
    Encode(String),
    #[error("payload decoding failed: {0}")]
    Decode(String),
}

/// Boundary trait for the external wire codec.
///
/// Implementations map an ordered list of typed metrics plus sequence and
/// timestamp to protocol bytes and back. The session layer never inspects
/// the encoded form.
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, payload: &Payload) -> Result<Bytes, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Payload, CodecError>;
}

pub type DynPayloadCodec = dyn PayloadCodec;

/// JSON codec, suitable for tests and in-process deployments.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl PayloadCodec for JsonCodec {
    fn encode(&self, payload: &Payload) -> Result<Bytes, CodecError> {
        let bytes = serde_json::to_vec(payload).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Bytes::from(bytes))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Payload, CodecError> {
        let payload: Payload =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        for metric in &payload.metrics {
            if !metric.shape_is_consistent() {
                return Err(CodecError::Decode(format!(
                    "metric {} value shape does not match its declared datatype",
                    metric.name()
                )));
            }
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataType;

    #[test]
    fn json_codec_round_trip() {
        let payload = Payload {
            seq: Some(3),
            timestamp: 1234,
            metrics: vec![
                Metric::new("Temperature", 22.5f64).unwrap(),
                Metric::new("Note", "warm")
                    .unwrap()
                    .with_datatype(DataType::Text)
                    .unwrap(),
            ],
        };
        let codec = JsonCodec::new();
        let bytes = codec.encode(&payload).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn json_codec_rejects_inconsistent_tags() {
        let json = r#"{
            "seq": 1,
            "timestamp": 0,
            "metrics": [
                {"name": "x", "value": {"Int32": 1}, "datatype": "Boolean", "timestamp": 0}
            ]
        }"#;
        let codec = JsonCodec::new();
        assert!(matches!(
            codec.decode(json.as_bytes()),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn json_codec_rejects_garbage() {
        let codec = JsonCodec::new();
        assert!(codec.decode(b"not json").is_err());
    }
}
