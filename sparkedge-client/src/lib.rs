//! Transport boundary for the sparkedge Sparkplug edge publisher.
//!
//! The pub/sub transport (connection establishment, reconnect, last-will
//! delivery, QoS) is an external collaborator. This crate defines the traits
//! and event types the session layer consumes, plus a channel-backed
//! in-process implementation for tests.
//!
//! # Feature Flags
//!
//! - `channel-transport`: Enables the channel based [EventLoop] and
//!   [Transport] implementation. Disabled by default.

mod traits;
mod types;

pub use traits::{DynEventLoop, DynTransport, EventLoop, Transport};
pub use types::*;

/// A basic [EventLoop] and [Transport] implementation based on channels
///
/// Useful for writing tests where it is not appropriate to be running a real
/// MQTT client and broker setup
#[cfg(feature = "channel-transport")]
pub mod channel;
