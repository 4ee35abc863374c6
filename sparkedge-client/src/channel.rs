use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sparkedge_types::topic::TopicFilter;
use tokio::sync::mpsc;

use crate::{Event, LastWill, Publish, TransportError};

/// An enum representing the messages and requests a [ChannelTransport] can
/// send to the [ChannelBroker]
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    Disconnect,
    Publish(Publish),
    Subscribe(Vec<TopicFilter>),
}

/// A [Transport](crate::Transport) implementation that uses channels for
/// message passing.
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

#[async_trait]
impl crate::Transport for ChannelTransport {
    async fn disconnect(&self) -> Result<(), TransportError> {
        self.tx
            .send(OutboundMessage::Disconnect)
            .map_err(|_| TransportError::Closed)
    }

    async fn publish(&self, publish: Publish) -> Result<(), TransportError> {
        self.tx
            .send(OutboundMessage::Publish(publish))
            .map_err(|_| TransportError::Closed)
    }

    async fn subscribe_many(&self, filters: Vec<TopicFilter>) -> Result<(), TransportError> {
        self.tx
            .send(OutboundMessage::Subscribe(filters))
            .map_err(|_| TransportError::Closed)
    }
}

/// A "broker" that manages the communication between a [ChannelTransport]
/// and a [ChannelEventLoop].
///
/// Used to inject events into the event loop and inspect messages/requests
/// produced by the transport.
pub struct ChannelBroker {
    pub rx_outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    pub tx_event: mpsc::UnboundedSender<Event>,
    last_will: Arc<Mutex<Option<LastWill>>>,
}

impl ChannelBroker {
    /// Retrieves the last will currently registered with the event loop, if
    /// any.
    pub fn last_will(&self) -> Option<LastWill> {
        self.last_will.lock().unwrap().clone()
    }
}

/// An [EventLoop](crate::EventLoop) implementation that uses channels
pub struct ChannelEventLoop {
    rx: mpsc::UnboundedReceiver<Event>,
    last_will: Arc<Mutex<Option<LastWill>>>,
}

impl ChannelEventLoop {
    /// Creates a new event loop along with the corresponding transport and
    /// broker.
    pub fn new() -> (Self, ChannelTransport, ChannelBroker) {
        let (tx_event, rx_event) = mpsc::unbounded_channel();
        let (tx_outbound, rx_outbound) = mpsc::unbounded_channel();
        let last_will = Arc::new(Mutex::new(None));
        let el = Self {
            rx: rx_event,
            last_will: last_will.clone(),
        };
        (
            el,
            ChannelTransport { tx: tx_outbound },
            ChannelBroker {
                rx_outbound,
                tx_event,
                last_will,
            },
        )
    }
}

#[async_trait]
impl crate::EventLoop for ChannelEventLoop {
    async fn poll(&mut self) -> Event {
        match self.rx.recv().await {
            Some(event) => event,
            /* broker dropped; nothing further will ever arrive */
            None => std::future::pending().await,
        }
    }

    fn set_last_will(&mut self, will: LastWill) {
        let mut lw = self.last_will.lock().unwrap();
        *lw = Some(will)
    }
}
