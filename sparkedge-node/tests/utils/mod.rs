use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sparkedge_client::channel::{ChannelBroker, ChannelEventLoop, ChannelTransport, OutboundMessage};
use sparkedge_client::{Event, Publish, Transport, TransportError};
use sparkedge_node::{EdgeNodeBuilder, NodeHandle};
use sparkedge_types::{
    constants::{BDSEQ, NODE_CONTROL_REBIRTH},
    topic::{
        DeviceMessageKind, DeviceTopic, NodeMessageKind, NodeTopic, QoS, Topic, TopicFilter,
    },
    JsonCodec, Metric, MetricValue, Payload, PayloadCodec,
};
use tokio::time::timeout;

pub fn setup(group_id: &str, node_id: &str) -> (NodeHandle, ChannelBroker) {
    let (eventloop, transport, broker) = ChannelEventLoop::new();
    let (node, handle) = EdgeNodeBuilder::new(Box::new(eventloop), Arc::new(transport))
        .with_group_id(group_id)
        .with_node_id(node_id)
        .with_codec(JsonCodec::new())
        .build()
        .unwrap();
    tokio::spawn(node.run());
    (handle, broker)
}

/// A transport whose publishes can be made to fail on demand while the
/// connection itself stays up.
pub struct FaultyTransport {
    inner: ChannelTransport,
    pub reject_publishes: Arc<AtomicBool>,
}

impl FaultyTransport {
    pub fn new(inner: ChannelTransport) -> Self {
        Self {
            inner,
            reject_publishes: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Transport for FaultyTransport {
    async fn disconnect(&self) -> Result<(), TransportError> {
        self.inner.disconnect().await
    }

    async fn publish(&self, publish: Publish) -> Result<(), TransportError> {
        if self.reject_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("injected failure".to_string()));
        }
        self.inner.publish(publish).await
    }

    async fn subscribe_many(&self, filters: Vec<TopicFilter>) -> Result<(), TransportError> {
        self.inner.subscribe_many(filters).await
    }
}

pub fn decode(bytes: &Bytes) -> Payload {
    JsonCodec::new().decode(bytes).unwrap()
}

pub async fn recv(broker: &mut ChannelBroker) -> OutboundMessage {
    timeout(Duration::from_secs(1), broker.rx_outbound.recv())
        .await
        .expect("timed out waiting for an outbound message")
        .expect("broker channel closed")
}

pub async fn expect_silence(broker: &mut ChannelBroker) {
    let result = timeout(Duration::from_millis(200), broker.rx_outbound.recv()).await;
    if let Ok(Some(message)) = result {
        panic!("expected no outbound message, got {message:?}");
    }
}

pub async fn expect_publish(broker: &mut ChannelBroker) -> Publish {
    match recv(broker).await {
        OutboundMessage::Publish(publish) => publish,
        message => panic!("expected a publish, got {message:?}"),
    }
}

pub async fn expect_node_publish(
    broker: &mut ChannelBroker,
    group_id: &str,
    node_id: &str,
    kind: NodeMessageKind,
) -> Payload {
    let publish = expect_publish(broker).await;
    assert_eq!(publish.topic, NodeTopic::new(group_id, kind, node_id).topic);
    decode(&publish.payload)
}

pub async fn expect_device_publish(
    broker: &mut ChannelBroker,
    group_id: &str,
    node_id: &str,
    device_id: &str,
    kind: DeviceMessageKind,
) -> Payload {
    let publish = expect_publish(broker).await;
    assert_eq!(
        publish.topic,
        DeviceTopic::new(group_id, kind, node_id, device_id).topic
    );
    decode(&publish.payload)
}

pub fn find_metric<'a>(payload: &'a Payload, name: &str) -> &'a Metric {
    payload
        .metrics
        .iter()
        .find(|m| m.name() == name)
        .unwrap_or_else(|| panic!("payload has no metric named {name}"))
}

pub fn verify_nbirth_payload(payload: &Payload, expected_bdseq: i64) {
    /* a birth always restarts the sequence at 0 */
    assert_eq!(payload.seq, Some(0));
    assert_ne!(payload.timestamp, 0);
    assert_eq!(
        *find_metric(payload, BDSEQ).value(),
        MetricValue::Int64(expected_bdseq)
    );
    assert_eq!(
        *find_metric(payload, NODE_CONTROL_REBIRTH).value(),
        MetricValue::Boolean(false)
    );
}

/// Drive the broker online and consume the command subscription the node
/// issues in response.
pub async fn go_online(broker: &mut ChannelBroker, group_id: &str, node_id: &str) {
    broker.tx_event.send(Event::Online).unwrap();
    let filters = match recv(broker).await {
        OutboundMessage::Subscribe(filters) => filters,
        message => panic!("expected a subscription, got {message:?}"),
    };
    let expected = vec![
        TopicFilter::new_with_qos(
            Topic::Node(NodeTopic::new(group_id, NodeMessageKind::NCmd, node_id)),
            QoS::AtLeastOnce,
        ),
        TopicFilter::new_with_qos(
            Topic::Device(DeviceTopic::new(
                group_id,
                DeviceMessageKind::DCmd,
                node_id,
                "+",
            )),
            QoS::AtLeastOnce,
        ),
    ];
    assert_eq!(filters, expected);
}

/// Wait for the event loop to have registered a last will carrying the
/// expected generation. The will update travels on its own channel, so poll.
pub async fn wait_for_will_bdseq(broker: &ChannelBroker, expected_bdseq: i64) {
    for _ in 0..100 {
        if let Some(will) = broker.last_will() {
            let payload = decode(&will.payload);
            if payload.seq.is_none()
                && *find_metric(&payload, BDSEQ).value() == MetricValue::Int64(expected_bdseq)
            {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("last will with bdSeq {expected_bdseq} never registered");
}
