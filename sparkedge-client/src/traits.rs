use async_trait::async_trait;
use sparkedge_types::topic::TopicFilter;

use crate::{Event, LastWill, Publish, TransportError};

/// The outbound half of the transport collaborator.
///
/// Implementations are expected to be cheap to clone behind an `Arc` and
/// safe to call from multiple tasks.
#[async_trait]
pub trait Transport {
    /// Requests a graceful shutdown of the connection.
    ///
    /// A clean disconnect must not trigger delivery of the registered last
    /// will; the will and clean shutdown are mutually exclusive signalling
    /// paths.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Hands an encoded message to the transport for delivery.
    ///
    /// Yields until the transport has accepted the message, not until the
    /// broker acknowledges it; delivery assurance beyond that point is the
    /// transport's responsibility.
    async fn publish(&self, publish: Publish) -> Result<(), TransportError>;

    /// Subscribes to a single topic filter.
    async fn subscribe(&self, filter: TopicFilter) -> Result<(), TransportError> {
        self.subscribe_many(vec![filter]).await
    }

    /// Subscribes to multiple topic filters in a single operation.
    async fn subscribe_many(&self, filters: Vec<TopicFilter>) -> Result<(), TransportError>;
}

pub type DynTransport = dyn Transport + Send + Sync;

/// The inbound half of the transport collaborator.
///
/// Polling drives the connection; connect/disconnect transitions and
/// received messages surface as [Event]s.
#[async_trait]
pub trait EventLoop {
    async fn poll(&mut self) -> Event;

    /// Registers the message the transport delivers on abnormal
    /// disconnection. Takes effect from the next connection attempt.
    fn set_last_will(&mut self, will: LastWill);
}

pub type DynEventLoop = dyn EventLoop + Send;
