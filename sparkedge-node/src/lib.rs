//! Publishing side of a Sparkplug B edge node.
//!
//! An [EdgeNode] owns the session lifecycle: birth and death certificates,
//! the per-session sequence counter, the durable birth/death generation
//! counter (`bdSeq`) and the last-known metric cache. Publishing happens
//! through a cloneable [NodeHandle]. The transport and wire codec are
//! external collaborators, see [sparkedge_client] and
//! [sparkedge_types::PayloadCodec].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sparkedge_client::channel::ChannelEventLoop;
//! use sparkedge_node::EdgeNodeBuilder;
//! use sparkedge_types::{JsonCodec, Metric};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (eventloop, transport, _broker) = ChannelEventLoop::new();
//!     let (node, handle) = EdgeNodeBuilder::new(Box::new(eventloop), Arc::new(transport))
//!         .with_group_id("Plant1")
//!         .with_node_id("Gateway3")
//!         .with_codec(JsonCodec::new())
//!         .build()
//!         .unwrap();
//!
//!     tokio::spawn(node.run());
//!     handle.connect(Duration::from_secs(5)).await.unwrap();
//!     let metrics = vec![Metric::new("Temperature", 22.5).unwrap()];
//!     handle.publish_node_birth(metrics).await.unwrap();
//! }
//! ```

mod assembler;
mod bdseq;
mod builder;
mod cache;
mod error;
mod node;
mod seq;

pub use bdseq::{BdSeqStore, FileBdSeqStore, MemoryBdSeqStore};
pub use builder::EdgeNodeBuilder;
pub use error::{ConnectError, PublishError};
pub use node::{EdgeNode, NodeHandle};
