use std::time::Duration;

use sparkedge_client::TransportError;
use sparkedge_types::{CodecError, MetricError};
use thiserror::Error;

/// Errors surfaced by the session orchestrator's publish operations.
#[derive(Debug, Error, PartialEq)]
pub enum PublishError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("no metrics provided")]
    NoMetrics,
    #[error("transport is not connected")]
    NotConnected,
    #[error("node has not published a birth in this session")]
    NotBirthed,
    #[error("device {0} has not published a birth since its last death")]
    DeviceNotBorn(String),
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("codec failure: {0}")]
    Codec(#[from] CodecError),
}

impl From<MetricError> for PublishError {
    fn from(value: MetricError) -> Self {
        PublishError::InvalidArgument(value.to_string())
    }
}

/// Errors surfaced while waiting for the session to connect.
#[derive(Debug, Error, PartialEq)]
pub enum ConnectError {
    #[error("transport did not reach the connected state within {0:?}")]
    Timeout(Duration),
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}
