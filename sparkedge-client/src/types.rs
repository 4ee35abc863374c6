use bytes::Bytes;
use sparkedge_types::topic::{DeviceTopic, NodeTopic, QoS};
use thiserror::Error;

/// Failures reported by the transport collaborator.
///
/// The session layer propagates these to the caller of the operation that
/// triggered them; it never swallows them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,
    #[error("transport rejected the request: {0}")]
    Rejected(String),
}

/// An enum representing the different types of inbound message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageKind {
    Birth,
    Death,
    Cmd,
    Data,
}

/// An inbound message: the raw encoded payload and the kind of topic it was
/// received on. Decoding is the session layer's job, via its codec.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Bytes,
}

/// A message addressed to the node itself.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMessage {
    pub group_id: String,
    pub node_id: String,
    pub message: Message,
}

/// A message addressed to one of the node's devices.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMessage {
    pub group_id: String,
    pub node_id: String,
    pub device_id: String,
    pub message: Message,
}

/// Events an [EventLoop](crate::EventLoop) implementation can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The transport reached the connected state.
    Online,
    /// The transport lost its connection.
    Offline,
    Node(NodeMessage),
    Device(DeviceMessage),
}

/// An outgoing publish request handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Publish {
    pub topic: String,
    pub qos: QoS,
    pub retain: bool,
    pub payload: Bytes,
}

impl Publish {
    pub fn new_node(topic: NodeTopic, payload: Bytes) -> Self {
        let (qos, retain) = topic.get_publish_quality_retain();
        Self {
            topic: topic.topic,
            qos,
            retain,
            payload,
        }
    }

    pub fn new_device(topic: DeviceTopic, payload: Bytes) -> Self {
        let (qos, retain) = topic.get_publish_quality_retain();
        Self {
            topic: topic.topic,
            qos,
            retain,
            payload,
        }
    }
}

/// The message the transport delivers on the node's behalf if the session
/// dies uncleanly. Mutually exclusive with a clean disconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub retain: bool,
    pub qos: QoS,
    pub payload: Bytes,
}

impl LastWill {
    pub fn new_node(group_id: &str, node_id: &str, payload: Bytes) -> Self {
        let topic = NodeTopic::new(
            group_id,
            sparkedge_types::topic::NodeMessageKind::NDeath,
            node_id,
        );
        let (qos, retain) = topic.get_publish_quality_retain();
        Self {
            topic: topic.topic,
            retain,
            qos,
            payload,
        }
    }
}
