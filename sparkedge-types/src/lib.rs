//! Shared types for the sparkedge Sparkplug edge publisher.
//!
//! This crate holds the metric data model (tagged-union values with declared
//! datatype tags), the payload structure handed to the wire codec, the topic
//! grammar, and small shared utilities. It contains no session state.

pub mod constants;
pub mod topic;
pub mod utils;

mod metric;
mod payload;
mod value;

pub use metric::{Metric, MetricError};
pub use payload::{CodecError, DynPayloadCodec, JsonCodec, Payload, PayloadCodec};
pub use value::{DataType, MetricValue};
