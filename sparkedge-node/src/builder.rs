use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sparkedge_client::{DynEventLoop, DynTransport};
use sparkedge_types::{DynPayloadCodec, PayloadCodec};

use crate::{
    bdseq::{BdSeqStore, FileBdSeqStore, MemoryBdSeqStore},
    node::{EdgeNode, NodeHandle},
};

const DEFAULT_REBIRTH_REQUEST_COOLDOWN: Duration = Duration::from_secs(5);

/// Builder for creating an [EdgeNode] and its [NodeHandle].
///
/// The transport event loop, transport client and payload codec are external
/// collaborators supplied by the caller; group id, node id and codec are
/// required, everything else has a default.
pub struct EdgeNodeBuilder {
    pub(crate) group_id: Option<String>,
    pub(crate) node_id: Option<String>,
    pub(crate) eventloop_transport: (Box<DynEventLoop>, Arc<DynTransport>),
    pub(crate) codec: Option<Arc<DynPayloadCodec>>,
    pub(crate) store: Box<dyn BdSeqStore>,
    pub(crate) rebirth_request_cooldown: Duration,
}

impl EdgeNodeBuilder {
    pub fn new(eventloop: Box<DynEventLoop>, transport: Arc<DynTransport>) -> Self {
        Self {
            group_id: None,
            node_id: None,
            eventloop_transport: (eventloop, transport),
            codec: None,
            store: Box::new(MemoryBdSeqStore::new()),
            rebirth_request_cooldown: DEFAULT_REBIRTH_REQUEST_COOLDOWN,
        }
    }

    pub fn with_group_id<S: Into<String>>(mut self, group_id: S) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_node_id<S: Into<String>>(mut self, node_id: S) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Set the codec used to encode outbound payloads and decode inbound
    /// commands. Required.
    pub fn with_codec<C: PayloadCodec + 'static>(mut self, codec: C) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    /// Set the durable store for the birth/death generation counter. The
    /// default keeps it in memory only.
    pub fn with_bdseq_store<S: BdSeqStore + 'static>(mut self, store: S) -> Self {
        self.store = Box::new(store);
        self
    }

    /// Persist the generation counter to a file at `path`.
    pub fn with_bdseq_file<P: Into<PathBuf>>(self, path: P) -> Self {
        self.with_bdseq_store(FileBdSeqStore::new(path))
    }

    /// Set the minimum interval between honored host rebirth requests.
    pub fn with_rebirth_request_cooldown(mut self, cooldown: Duration) -> Self {
        self.rebirth_request_cooldown = cooldown;
        self
    }

    /// Build the edge node. Fails if the group id, node id or codec are
    /// missing, or an id contains reserved topic characters.
    pub fn build(self) -> Result<(EdgeNode, NodeHandle), String> {
        EdgeNode::new_from_builder(self)
    }
}
