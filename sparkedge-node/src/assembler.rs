use std::sync::Arc;

use bytes::Bytes;
use sparkedge_types::{constants, utils, DynPayloadCodec, Metric, Payload};

use crate::error::PublishError;

/// Pairs a metric list with a sequence number and timestamp and invokes the
/// external codec. Also synthesizes the protocol-mandated control metrics
/// for node birth and death payloads.
pub(crate) struct PayloadAssembler {
    codec: Arc<DynPayloadCodec>,
}

fn bdseq_metric(bdseq: u64) -> Result<Metric, PublishError> {
    Ok(Metric::new(constants::BDSEQ, bdseq as i64)?)
}

impl PayloadAssembler {
    pub fn new(codec: Arc<DynPayloadCodec>) -> Self {
        Self { codec }
    }

    fn encode(&self, payload: &Payload) -> Result<Bytes, PublishError> {
        Ok(self.codec.encode(payload)?)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Payload, PublishError> {
        Ok(self.codec.decode(bytes)?)
    }

    /// Data payload for node or device scope: metrics as given, next seq.
    pub fn data(&self, seq: u64, metrics: Vec<Metric>) -> Result<Bytes, PublishError> {
        self.encode(&Payload {
            seq: Some(seq),
            timestamp: utils::timestamp(),
            metrics,
        })
    }

    /// Node birth payload: `bdSeq` and the rebirth-request flag (cleared)
    /// ahead of the announced metrics.
    pub fn node_birth(
        &self,
        seq: u64,
        bdseq: u64,
        metrics: Vec<Metric>,
    ) -> Result<Bytes, PublishError> {
        let mut payload_metrics = Vec::with_capacity(metrics.len() + 2);
        payload_metrics.push(bdseq_metric(bdseq)?);
        payload_metrics.push(Metric::new(constants::NODE_CONTROL_REBIRTH, false)?);
        payload_metrics.extend(metrics);
        self.encode(&Payload {
            seq: Some(seq),
            timestamp: utils::timestamp(),
            metrics: payload_metrics,
        })
    }

    /// Device birth payload: the device's full metric list, next seq.
    pub fn device_birth(&self, seq: u64, metrics: Vec<Metric>) -> Result<Bytes, PublishError> {
        self.data(seq, metrics)
    }

    /// Device death payload: empty metric list, next seq.
    pub fn device_death(&self, seq: u64) -> Result<Bytes, PublishError> {
        self.encode(&Payload {
            seq: Some(seq),
            timestamp: utils::timestamp(),
            metrics: Vec::new(),
        })
    }

    /// Node death payload carrying only the generation it belongs to. Used
    /// both as the registered last will and for the explicit death published
    /// on shutdown. No sequence number.
    pub fn node_death(&self, bdseq: u64) -> Result<Bytes, PublishError> {
        self.encode(&Payload {
            seq: None,
            timestamp: utils::timestamp(),
            metrics: vec![bdseq_metric(bdseq)?],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkedge_types::{DataType, JsonCodec, MetricValue, PayloadCodec};

    fn assembler() -> PayloadAssembler {
        PayloadAssembler::new(Arc::new(JsonCodec::new()))
    }

    fn decode(bytes: &Bytes) -> Payload {
        JsonCodec::new().decode(bytes).unwrap()
    }

    #[test]
    fn node_birth_carries_control_metrics_first() {
        let metrics = vec![Metric::new("Temperature", 22.5f64).unwrap()];
        let bytes = assembler().node_birth(0, 3, metrics).unwrap();
        let payload = decode(&bytes);

        assert_eq!(payload.seq, Some(0));
        assert_eq!(payload.metrics.len(), 3);
        assert_eq!(payload.metrics[0].name(), constants::BDSEQ);
        assert_eq!(*payload.metrics[0].value(), MetricValue::Int64(3));
        assert_eq!(payload.metrics[0].datatype(), DataType::Int64);
        assert_eq!(payload.metrics[1].name(), constants::NODE_CONTROL_REBIRTH);
        assert_eq!(*payload.metrics[1].value(), MetricValue::Boolean(false));
        assert_eq!(payload.metrics[2].name(), "Temperature");
    }

    #[test]
    fn device_death_is_empty_with_seq() {
        let bytes = assembler().device_death(7).unwrap();
        let payload = decode(&bytes);
        assert_eq!(payload.seq, Some(7));
        assert!(payload.metrics.is_empty());
    }

    #[test]
    fn node_death_has_no_seq_and_only_bdseq() {
        let bytes = assembler().node_death(4).unwrap();
        let payload = decode(&bytes);
        assert_eq!(payload.seq, None);
        assert_eq!(payload.metrics.len(), 1);
        assert_eq!(payload.metrics[0].name(), constants::BDSEQ);
        assert_eq!(*payload.metrics[0].value(), MetricValue::Int64(4));
    }
}
