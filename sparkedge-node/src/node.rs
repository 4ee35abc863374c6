use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use sparkedge_client::{
    DeviceMessage, DynEventLoop, DynTransport, Event, LastWill, MessageKind, NodeMessage, Publish,
    TransportError,
};
use sparkedge_types::{
    constants::NODE_CONTROL_REBIRTH,
    topic::{
        DeviceMessageKind, DeviceTopic, NodeMessageKind, NodeTopic, QoS, Topic, TopicFilter,
    },
    Metric, MetricValue,
};
use tokio::{
    select,
    sync::{mpsc, watch},
    time::timeout,
};

use crate::{
    assembler::PayloadAssembler,
    bdseq::BdSeqStore,
    builder::EdgeNodeBuilder,
    cache::{validate_device_id, ChangeSet, MetricCache},
    error::{ConnectError, PublishError},
    seq::SequenceCounter,
};

pub(crate) struct NodeConfig {
    pub rebirth_request_cooldown: Duration,
}

/// State mutated only on the serialized publish/connect path. One publish
/// operation completes its sequence assignment and transport hand-off before
/// the next begins.
struct SessionState {
    seq: SequenceCounter,
    bdseq: u64,
    connected: bool,
    birthed: bool,
    store: Box<dyn BdSeqStore>,
}

pub(crate) struct EdgeNodeState {
    running: AtomicBool,
    pub group_id: String,
    pub node_id: String,
    cache: MetricCache,
    session: tokio::sync::Mutex<SessionState>,
    connected_tx: watch::Sender<bool>,
}

/// Shared innards of the orchestrator: everything needed to assemble and
/// hand off messages, cloneable into the reaction worker and every handle.
#[derive(Clone)]
pub(crate) struct SessionCore {
    state: Arc<EdgeNodeState>,
    transport: Arc<DynTransport>,
    assembler: Arc<PayloadAssembler>,
    will_tx: mpsc::UnboundedSender<LastWill>,
}

impl SessionCore {
    fn node_topic(&self, kind: NodeMessageKind) -> NodeTopic {
        NodeTopic::new(&self.state.group_id, kind, &self.state.node_id)
    }

    fn device_topic(&self, kind: DeviceMessageKind, device_id: &str) -> DeviceTopic {
        DeviceTopic::new(&self.state.group_id, kind, &self.state.node_id, device_id)
    }

    fn sub_topics(&self) -> Vec<TopicFilter> {
        vec![
            TopicFilter::new_with_qos(
                Topic::Node(self.node_topic(NodeMessageKind::NCmd)),
                QoS::AtLeastOnce,
            ),
            TopicFilter::new_with_qos(
                Topic::Device(self.device_topic(DeviceMessageKind::DCmd, "+")),
                QoS::AtLeastOnce,
            ),
        ]
    }

    fn make_will(&self, bdseq: u64) -> Result<LastWill, PublishError> {
        let payload = self.assembler.node_death(bdseq)?;
        Ok(LastWill::new_node(
            &self.state.group_id,
            &self.state.node_id,
            payload,
        ))
    }

    /// Hand the run loop an updated will carrying the generation of the
    /// birth that was just published.
    fn push_will(&self, bdseq: u64) {
        match self.make_will(bdseq) {
            Ok(will) => {
                _ = self.will_tx.send(will);
            }
            Err(e) => warn!(
                "Unable to assemble last will. node={} error={e}",
                self.state.node_id
            ),
        }
    }

    /// Increment-and-persist the generation counter, restart the sequence
    /// and publish an NBIRTH. Callers hold the session lock.
    async fn node_birth_locked(
        &self,
        session: &mut SessionState,
        metrics: Vec<Metric>,
    ) -> Result<(), PublishError> {
        /* the generation must be durable before the birth referencing it is sent */
        let bdseq = session.store.increment_and_save(session.bdseq);
        session.bdseq = bdseq;
        let seq = session.seq.reset();
        let bytes = self.assembler.node_birth(seq, bdseq, metrics)?;
        self.transport
            .publish(Publish::new_node(
                self.node_topic(NodeMessageKind::NBirth),
                bytes,
            ))
            .await?;
        session.birthed = true;
        self.push_will(bdseq);
        Ok(())
    }

    /// Full re-announcement from cached state: node birth first, then a
    /// device birth for every known device with metrics. No-op if no node
    /// metrics are cached yet.
    async fn announce_births_locked(
        &self,
        session: &mut SessionState,
    ) -> Result<(), PublishError> {
        self.state.cache.reset_change_tracking();
        session.seq.reset();
        let node_metrics = self.state.cache.all_node();
        if node_metrics.is_empty() {
            return Ok(());
        }
        self.node_birth_locked(session, node_metrics).await?;
        for (device_id, metrics) in self.state.cache.all_devices() {
            if metrics.is_empty() {
                continue;
            }
            let seq = session.seq.next();
            let bytes = self.assembler.device_birth(seq, metrics)?;
            self.transport
                .publish(Publish::new_device(
                    self.device_topic(DeviceMessageKind::DBirth, &device_id),
                    bytes,
                ))
                .await?;
        }
        Ok(())
    }

    pub async fn publish_node_birth(&self, metrics: Vec<Metric>) -> Result<(), PublishError> {
        let mut session = self.state.session.lock().await;
        if !session.connected {
            return Err(PublishError::NotConnected);
        }
        for metric in &metrics {
            self.state.cache.upsert_node(metric.clone())?;
        }
        self.node_birth_locked(&mut session, metrics).await
    }

    pub async fn publish_node_data(&self, metrics: Vec<Metric>) -> Result<(), PublishError> {
        if metrics.is_empty() {
            return Err(PublishError::NoMetrics);
        }
        let mut session = self.state.session.lock().await;
        if !session.connected {
            return Err(PublishError::NotConnected);
        }
        if !session.birthed {
            return Err(PublishError::NotBirthed);
        }
        for metric in &metrics {
            self.state.cache.upsert_node(metric.clone())?;
        }
        let seq = session.seq.next();
        let bytes = self.assembler.data(seq, metrics)?;
        self.transport
            .publish(Publish::new_node(
                self.node_topic(NodeMessageKind::NData),
                bytes,
            ))
            .await?;
        Ok(())
    }

    pub async fn publish_device_birth(
        &self,
        device_id: &str,
        metrics: Vec<Metric>,
    ) -> Result<(), PublishError> {
        validate_device_id(device_id)?;
        let mut session = self.state.session.lock().await;
        if !session.connected {
            return Err(PublishError::NotConnected);
        }
        if !session.birthed {
            return Err(PublishError::NotBirthed);
        }
        self.state.cache.ensure_device(device_id)?;
        for metric in &metrics {
            self.state.cache.upsert_device(device_id, metric.clone())?;
        }
        let seq = session.seq.next();
        let bytes = self.assembler.device_birth(seq, metrics)?;
        self.transport
            .publish(Publish::new_device(
                self.device_topic(DeviceMessageKind::DBirth, device_id),
                bytes,
            ))
            .await?;
        Ok(())
    }

    pub async fn publish_device_data(
        &self,
        device_id: &str,
        metrics: Vec<Metric>,
    ) -> Result<(), PublishError> {
        validate_device_id(device_id)?;
        if metrics.is_empty() {
            return Err(PublishError::NoMetrics);
        }
        let mut session = self.state.session.lock().await;
        if !session.connected {
            return Err(PublishError::NotConnected);
        }
        if !session.birthed {
            return Err(PublishError::NotBirthed);
        }
        if !self.state.cache.has_device(device_id) {
            return Err(PublishError::DeviceNotBorn(device_id.to_string()));
        }
        for metric in &metrics {
            self.state.cache.upsert_device(device_id, metric.clone())?;
        }
        let seq = session.seq.next();
        let bytes = self.assembler.data(seq, metrics)?;
        self.transport
            .publish(Publish::new_device(
                self.device_topic(DeviceMessageKind::DData, device_id),
                bytes,
            ))
            .await?;
        Ok(())
    }

    pub async fn publish_device_death(&self, device_id: &str) -> Result<(), PublishError> {
        validate_device_id(device_id)?;
        let mut session = self.state.session.lock().await;
        if !session.connected {
            return Err(PublishError::NotConnected);
        }
        if !session.birthed {
            return Err(PublishError::NotBirthed);
        }
        /* drop the scope first so no concurrent read observes a dead device */
        if !self.state.cache.remove_device(device_id) {
            return Err(PublishError::DeviceNotBorn(device_id.to_string()));
        }
        let seq = session.seq.next();
        let bytes = self.assembler.device_death(seq)?;
        self.transport
            .publish(Publish::new_device(
                self.device_topic(DeviceMessageKind::DDeath, device_id),
                bytes,
            ))
            .await?;
        Ok(())
    }

    pub async fn publish_changed(&self) -> Result<(), PublishError> {
        let mut session = self.state.session.lock().await;
        if !session.connected {
            return Err(PublishError::NotConnected);
        }
        if !session.birthed {
            return Err(PublishError::NotBirthed);
        }
        let changes = self.state.cache.compute_changes();
        if let Err(e) = self.send_changes_locked(&mut session, changes).await {
            /* the snapshot already advanced past the unsent values; drop it
             * so the next call re-reports them instead of losing them */
            self.state.cache.reset_change_tracking();
            return Err(e);
        }
        Ok(())
    }

    async fn send_changes_locked(
        &self,
        session: &mut SessionState,
        changes: ChangeSet,
    ) -> Result<(), PublishError> {
        if !changes.node.is_empty() {
            let seq = session.seq.next();
            let bytes = self.assembler.data(seq, changes.node)?;
            self.transport
                .publish(Publish::new_node(
                    self.node_topic(NodeMessageKind::NData),
                    bytes,
                ))
                .await?;
        }
        for (device_id, metrics) in changes.devices {
            let seq = session.seq.next();
            let bytes = self.assembler.data(seq, metrics)?;
            self.transport
                .publish(Publish::new_device(
                    self.device_topic(DeviceMessageKind::DData, &device_id),
                    bytes,
                ))
                .await?;
        }
        Ok(())
    }

    pub async fn rebirth(&self) -> Result<(), PublishError> {
        let mut session = self.state.session.lock().await;
        if !session.connected {
            return Err(PublishError::NotConnected);
        }
        self.announce_births_locked(&mut session).await
    }

    async fn on_online(&self) {
        let mut session = self.state.session.lock().await;
        if session.connected {
            return;
        }
        session.connected = true;
        session.birthed = false;
        session.seq.reset();
        info!("Edge node online. Node = {}", self.state.node_id);

        if self.transport.subscribe_many(self.sub_topics()).await.is_err() {
            error!(
                "Failed to subscribe to command topics. node={}",
                self.state.node_id
            );
            _ = self.state.connected_tx.send(true);
            return;
        }

        /* metrics carried over from a previous connection in this process
         * get re-announced without producer involvement */
        if let Err(e) = self.announce_births_locked(&mut session).await {
            error!(
                "Publishing birth messages on reconnect failed. node={} error={e}",
                self.state.node_id
            );
        }
        _ = self.state.connected_tx.send(true);
    }

    async fn on_offline(&self) {
        let mut session = self.state.session.lock().await;
        if !session.connected {
            return;
        }
        session.connected = false;
        session.birthed = false;
        _ = self.state.connected_tx.send(false);
        info!("Edge node offline. Node = {}", self.state.node_id);
    }
}

/// A handle for interacting with the edge node: lifecycle operations,
/// metric publishing and cache access.
#[derive(Clone)]
pub struct NodeHandle {
    core: SessionCore,
    stop_tx: mpsc::Sender<Shutdown>,
}

impl NodeHandle {
    /// Wait until the transport reports the connected state.
    ///
    /// The connection itself is driven by [EdgeNode::run]; this resolves
    /// once the session is usable, or fails with a timeout after `wait`.
    pub async fn connect(&self, wait: Duration) -> Result<(), ConnectError> {
        let mut rx = self.core.state.connected_tx.subscribe();
        if *rx.borrow() {
            return Ok(());
        }
        let result = match timeout(wait, rx.wait_for(|connected| *connected)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(ConnectError::Transport(TransportError::Closed)),
            Err(_) => Err(ConnectError::Timeout(wait)),
        };
        result
    }

    /// Request a graceful transport shutdown.
    ///
    /// A clean disconnect never triggers the registered last will.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.core.transport.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        *self.core.state.connected_tx.borrow()
    }

    /// Stop all operations, publishing a death certificate and disconnecting
    /// from the broker.
    ///
    /// This will cancel [EdgeNode::run].
    pub async fn cancel(&self) {
        if !self.core.state.running.load(Ordering::SeqCst) {
            return;
        }
        info!("Edge node stopping. Node = {}", self.core.state.node_id);
        let bdseq = self.core.state.session.lock().await.bdseq;
        match self.core.assembler.node_death(bdseq) {
            Ok(bytes) => {
                let publish = Publish::new_node(
                    self.core.node_topic(NodeMessageKind::NDeath),
                    bytes,
                );
                if self.core.transport.publish(publish).await.is_err() {
                    debug!("Unable to publish node death certificate on exit");
                }
            }
            Err(e) => debug!("Unable to assemble node death certificate on exit: {e}"),
        }
        _ = self.stop_tx.send(Shutdown).await;
        _ = self.core.transport.disconnect().await;
    }

    /// Announce the node's full state: control metrics plus the given
    /// metrics at sequence 0, under a freshly persisted generation counter.
    pub async fn publish_node_birth(&self, metrics: Vec<Metric>) -> Result<(), PublishError> {
        self.core.publish_node_birth(metrics).await
    }

    /// Publish an incremental node update. Requires a prior node birth in
    /// this session.
    pub async fn publish_node_data(&self, metrics: Vec<Metric>) -> Result<(), PublishError> {
        self.core.publish_node_data(metrics).await
    }

    /// Announce a device's full state, creating its scope. Device births
    /// never touch the generation counter.
    pub async fn publish_device_birth(
        &self,
        device_id: &str,
        metrics: Vec<Metric>,
    ) -> Result<(), PublishError> {
        self.core.publish_device_birth(device_id, metrics).await
    }

    /// Publish an incremental device update. The device must have been born
    /// (and not died) in this process.
    pub async fn publish_device_data(
        &self,
        device_id: &str,
        metrics: Vec<Metric>,
    ) -> Result<(), PublishError> {
        self.core.publish_device_data(device_id, metrics).await
    }

    /// Announce a device is no longer reporting and atomically drop its
    /// metrics. Data publishes for the device are rejected until it is born
    /// again.
    pub async fn publish_device_death(&self, device_id: &str) -> Result<(), PublishError> {
        self.core.publish_device_death(device_id).await
    }

    /// Publish only the metrics whose values changed since the last call,
    /// as node/device data messages. Never publishes births.
    pub async fn publish_changed(&self) -> Result<(), PublishError> {
        self.core.publish_changed().await
    }

    /// Re-announce current state: node birth followed by a birth for every
    /// known device with metrics.
    pub async fn rebirth(&self) -> Result<(), PublishError> {
        self.core.rebirth().await
    }

    /// Update a node metric in the cache without publishing. Picked up by
    /// the next [NodeHandle::publish_changed] or rebirth.
    pub fn set_node_metric(&self, metric: Metric) -> Result<(), PublishError> {
        self.core.state.cache.upsert_node(metric)
    }

    /// Update a device metric in the cache without publishing. The device
    /// must have been born; a dead device is never recreated here.
    pub fn set_device_metric(&self, device_id: &str, metric: Metric) -> Result<(), PublishError> {
        self.core
            .state
            .cache
            .upsert_device_if_present(device_id, metric)
    }

    pub fn node_metric(&self, name: &str) -> Option<Metric> {
        self.core.state.cache.get_node(name)
    }

    pub fn device_metric(&self, device_id: &str, name: &str) -> Option<Metric> {
        self.core.state.cache.get_device(device_id, name)
    }

    pub fn node_metrics(&self) -> Vec<Metric> {
        self.core.state.cache.all_node()
    }

    pub fn device_metrics(&self, device_id: &str) -> Vec<Metric> {
        self.core.state.cache.all_device(device_id)
    }
}

#[derive(Debug)]
struct Shutdown;

enum ClientStateMessage {
    Online,
    Offline,
    Stopped,
}

enum InboundMessage {
    Node(NodeMessage),
    Device(DeviceMessage),
}

/// Reacts to transport state transitions and inbound command messages.
/// Runs as its own task so the event loop keeps being polled while a
/// reaction publishes.
struct SessionWorker {
    core: SessionCore,
    config: NodeConfig,
    last_rebirth_request: Option<Instant>,
    state_rx: mpsc::Receiver<ClientStateMessage>,
    message_rx: mpsc::UnboundedReceiver<InboundMessage>,
}

impl SessionWorker {
    async fn on_node_command(&mut self, message: NodeMessage) {
        let payload = match self.core.assembler.decode(&message.message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Received invalid CMD payload - ignoring request: {e}");
                return;
            }
        };

        let mut rebirth = false;
        for metric in &payload.metrics {
            if metric.name() != NODE_CONTROL_REBIRTH {
                continue;
            }
            match metric.value() {
                MetricValue::Boolean(true) => rebirth = true,
                _ => warn!("Received invalid CMD Rebirth metric - ignoring request"),
            }
        }
        if !rebirth {
            return;
        }

        let now = Instant::now();
        if let Some(last) = self.last_rebirth_request {
            if now.duration_since(last) < self.config.rebirth_request_cooldown {
                info!("Got Rebirth CMD but cooldown time not expired. Ignoring");
                return;
            }
        }
        info!("Got Rebirth CMD - Rebirthing Node");
        if let Err(e) = self.core.rebirth().await {
            warn!(
                "Rebirth requested by host failed. node={} error={e}",
                self.core.state.node_id
            );
        }
        self.last_rebirth_request = Some(now);
    }

    async fn on_message(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Node(message) => {
                if message.message.kind == MessageKind::Cmd {
                    self.on_node_command(message).await;
                } else {
                    debug!("Ignoring non-command node message");
                }
            }
            InboundMessage::Device(message) => {
                debug!(
                    "Device command handling is not supported - ignoring message for device {}",
                    message.device_id
                );
            }
        }
    }

    async fn run(mut self) {
        loop {
            select! {
                biased;
                maybe_state = self.state_rx.recv() => match maybe_state {
                    Some(ClientStateMessage::Online) => self.core.on_online().await,
                    Some(ClientStateMessage::Offline) => self.core.on_offline().await,
                    Some(ClientStateMessage::Stopped) | None => break,
                },
                maybe_message = self.message_rx.recv() => match maybe_message {
                    Some(message) => self.on_message(message).await,
                    None => break,
                },
            }
        }
    }
}

/// Structure that represents a Sparkplug edge node session.
///
/// See [EdgeNodeBuilder] on how to create an instance.
pub struct EdgeNode {
    eventloop: Box<DynEventLoop>,
    core: SessionCore,
    state_tx: mpsc::Sender<ClientStateMessage>,
    message_tx: mpsc::UnboundedSender<InboundMessage>,
    will_rx: mpsc::UnboundedReceiver<LastWill>,
    stop_rx: mpsc::Receiver<Shutdown>,
}

impl EdgeNode {
    pub(crate) fn new_from_builder(
        builder: EdgeNodeBuilder,
    ) -> Result<(Self, NodeHandle), String> {
        let group_id = builder
            .group_id
            .ok_or("group id must be provided".to_string())?;
        let node_id = builder
            .node_id
            .ok_or("node id must be provided".to_string())?;
        sparkedge_types::utils::validate_name(&group_id)?;
        sparkedge_types::utils::validate_name(&node_id)?;
        let codec = builder
            .codec
            .ok_or("payload codec must be provided".to_string())?;

        let (eventloop, transport) = builder.eventloop_transport;
        let mut store = builder.store;
        let bdseq = store.load();

        let state = Arc::new(EdgeNodeState {
            running: AtomicBool::new(false),
            cache: MetricCache::new(),
            session: tokio::sync::Mutex::new(SessionState {
                seq: SequenceCounter::new(),
                bdseq,
                connected: false,
                birthed: false,
                store,
            }),
            connected_tx: watch::channel(false).0,
            group_id,
            node_id,
        });

        let (will_tx, will_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = mpsc::channel(1);
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let core = SessionCore {
            state,
            transport,
            assembler: Arc::new(PayloadAssembler::new(codec)),
            will_tx,
        };

        let worker = SessionWorker {
            core: core.clone(),
            config: NodeConfig {
                rebirth_request_cooldown: builder.rebirth_request_cooldown,
            },
            last_rebirth_request: None,
            state_rx,
            message_rx,
        };
        tokio::spawn(async move { worker.run().await });

        let handle = NodeHandle {
            core: core.clone(),
            stop_tx,
        };

        let node = Self {
            eventloop,
            core,
            state_tx,
            message_tx,
            will_rx,
            stop_rx,
        };

        Ok((node, handle))
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Online => {
                _ = self.state_tx.send(ClientStateMessage::Online).await;
            }
            Event::Offline => {
                _ = self.state_tx.send(ClientStateMessage::Offline).await;
            }
            Event::Node(message) => {
                _ = self.message_tx.send(InboundMessage::Node(message));
            }
            Event::Device(message) => {
                _ = self.message_tx.send(InboundMessage::Device(message));
            }
        }
    }

    /// Run the edge node until [NodeHandle::cancel] is called.
    ///
    /// Polls the transport event loop and dispatches connect/disconnect
    /// transitions and inbound messages to the session.
    pub async fn run(mut self) {
        info!("Edge node running. Node = {}", self.core.state.node_id);
        self.core.state.running.store(true, Ordering::SeqCst);

        /* will for the generation loaded at startup; refreshed after every
         * birth via will_rx */
        let initial_bdseq = self.core.state.session.lock().await.bdseq;
        match self.core.make_will(initial_bdseq) {
            Ok(will) => self.eventloop.set_last_will(will),
            Err(e) => error!(
                "Unable to assemble initial last will. node={} error={e}",
                self.core.state.node_id
            ),
        }

        loop {
            select! {
                event = self.eventloop.poll() => self.handle_event(event).await,
                Some(will) = self.will_rx.recv() => self.eventloop.set_last_will(will),
                Some(_) = self.stop_rx.recv() => break,
            }
        }

        _ = self.state_tx.send(ClientStateMessage::Stopped).await;
        self.core.state.running.store(false, Ordering::SeqCst);
        info!("Edge node stopped. Node = {}", self.core.state.node_id);
    }
}
