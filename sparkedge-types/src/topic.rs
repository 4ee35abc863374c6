use crate::constants::{
    DBIRTH, DCMD, DDATA, DDEATH, NBIRTH, NCMD, NDATA, NDEATH, SPBV10,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeMessageKind {
    NBirth,
    NDeath,
    NData,
    NCmd,
}

impl NodeMessageKind {
    fn as_str(&self) -> &str {
        match self {
            NodeMessageKind::NBirth => NBIRTH,
            NodeMessageKind::NDeath => NDEATH,
            NodeMessageKind::NData => NDATA,
            NodeMessageKind::NCmd => NCMD,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeviceMessageKind {
    DBirth,
    DDeath,
    DData,
    DCmd,
}

impl DeviceMessageKind {
    fn as_str(&self) -> &str {
        match self {
            DeviceMessageKind::DBirth => DBIRTH,
            DeviceMessageKind::DDeath => DDEATH,
            DeviceMessageKind::DData => DDATA,
            DeviceMessageKind::DCmd => DCMD,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeTopic {
    pub topic: String,
    pub kind: NodeMessageKind,
}

impl NodeTopic {
    pub fn new(group_id: &str, kind: NodeMessageKind, node_id: &str) -> Self {
        Self {
            topic: node_topic(group_id, kind, node_id),
            kind,
        }
    }

    pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
        match self.kind {
            NodeMessageKind::NBirth => (QoS::AtMostOnce, false),
            NodeMessageKind::NData => (QoS::AtMostOnce, false),
            NodeMessageKind::NCmd => (QoS::AtMostOnce, false),
            NodeMessageKind::NDeath => (QoS::AtLeastOnce, false),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceTopic {
    pub topic: String,
    pub kind: DeviceMessageKind,
}

impl DeviceTopic {
    pub fn new(group_id: &str, kind: DeviceMessageKind, node_id: &str, device_id: &str) -> Self {
        Self {
            topic: device_topic(group_id, kind, node_id, device_id),
            kind,
        }
    }

    pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
        match self.kind {
            DeviceMessageKind::DBirth => (QoS::AtLeastOnce, false),
            DeviceMessageKind::DData => (QoS::AtMostOnce, false),
            DeviceMessageKind::DCmd => (QoS::AtMostOnce, false),
            DeviceMessageKind::DDeath => (QoS::AtLeastOnce, false),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Topic {
    Node(NodeTopic),
    Device(DeviceTopic),
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        match topic {
            Topic::Node(node_topic) => node_topic.topic,
            Topic::Device(device_topic) => device_topic.topic,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicFilter {
    pub topic: Topic,
    pub qos: QoS,
}

impl TopicFilter {
    pub fn new(topic: Topic) -> Self {
        Self::new_with_qos(topic, QoS::AtMostOnce)
    }

    pub fn new_with_qos(topic: Topic, qos: QoS) -> Self {
        Self { topic, qos }
    }
}

pub fn node_topic(group_id: &str, kind: NodeMessageKind, node_id: &str) -> String {
    format!("{}/{}/{}/{}", SPBV10, group_id, kind.as_str(), node_id)
}

pub fn device_topic(
    group_id: &str,
    kind: DeviceMessageKind,
    node_id: &str,
    device_id: &str,
) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        SPBV10,
        group_id,
        kind.as_str(),
        node_id,
        device_id
    )
}
