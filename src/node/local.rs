use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::core::{Error, NodeConfig, ObjectCode, Result, TidCounter};
use crate::network::{Inbound, TransportManager};
use crate::object::device::EPC_IDENTIFICATION_NUMBER;
use crate::object::object::Announcer;
use crate::object::profile::{identification_number, update_node_profile, EPC_INSTANCE_LIST_NOTIFICATION};
use crate::object::{Object, Property};
use crate::protocol::{Esv, Message};
use super::handler::handle_request;
use super::{BaseNode, NodeListener, NodeState};

/// Frames buffered between the receive tasks and the dispatcher
const INBOUND_QUEUE: usize = 256;

/// Polls made by `find_property_wait` within its timeout
const FIND_PROPERTY_RETRIES: u32 = 10;

/// The request `post_message` is waiting on
struct Pending {
    request: Message,
    tx: oneshot::Sender<Message>,
}

/// State shared by every handle of a node and its tasks
struct Shared {
    config: NodeConfig,
    objects: RwLock<BaseNode>,
    tid: Arc<TidCounter>,
    running: Arc<AtomicBool>,
    state: Mutex<NodeState>,
    announce_tx: mpsc::UnboundedSender<Message>,
    announce_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>>,
    transport: RwLock<Option<Arc<TransportManager>>>,
    token: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    post_lock: tokio::sync::Mutex<()>,
    pending: Mutex<Option<Pending>>,
    listener: RwLock<Option<Arc<dyn NodeListener>>>,
}

/// A node hosted by this process
///
/// Cloning yields another handle to the same node. The node answers
/// requests for its objects once started and keeps its node profile's
/// instance and class lists in step with the devices it holds.
#[derive(Clone)]
pub struct LocalNode {
    shared: Arc<Shared>,
}

impl LocalNode {
    /// Creates a stopped node holding only its node profile
    pub fn new(config: NodeConfig) -> Self {
        let tid = if config.random_initial_tid {
            TidCounter::random()
        } else {
            TidCounter::new(0)
        };
        let (announce_tx, announce_rx) = mpsc::unbounded_channel();
        let mut objects = BaseNode::new();
        objects.add_profile(Object::node_profile(config.manufacturer_code, config.read_only_profile));

        let node = LocalNode {
            shared: Arc::new(Shared {
                config,
                objects: RwLock::new(objects),
                tid: Arc::new(tid),
                running: Arc::new(AtomicBool::new(false)),
                state: Mutex::new(NodeState::Stopped),
                announce_tx,
                announce_rx: Arc::new(tokio::sync::Mutex::new(announce_rx)),
                transport: RwLock::new(None),
                token: Mutex::new(CancellationToken::new()),
                tasks: Mutex::new(Vec::new()),
                post_lock: tokio::sync::Mutex::new(()),
                pending: Mutex::new(None),
                listener: RwLock::new(None),
            }),
        };
        let announcer = node.announcer();
        for object in node.objects_mut().objects_mut() {
            object.attach_announcer(announcer.clone());
        }
        node
    }

    fn announcer(&self) -> Announcer {
        Announcer::new(
            self.shared.running.clone(),
            self.shared.tid.clone(),
            self.shared.announce_tx.clone(),
        )
    }

    /// Node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> NodeState {
        *lock(&self.shared.state)
    }

    /// Returns true while the node is running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Read access to the node's objects
    pub fn objects(&self) -> RwLockReadGuard<'_, BaseNode> {
        self.shared.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Write access to the node's objects
    ///
    /// Changes made through the guard are not reflected in the node
    /// profile; add objects with [`LocalNode::add_device`] and
    /// [`LocalNode::add_profile`].
    pub fn objects_mut(&self) -> RwLockWriteGuard<'_, BaseNode> {
        self.shared.objects.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Code of this node's node profile
    pub fn node_profile_code(&self) -> ObjectCode {
        if self.shared.config.read_only_profile {
            ObjectCode::NODE_PROFILE_READ_ONLY
        } else {
            ObjectCode::NODE_PROFILE
        }
    }

    /// Adds a device object and refreshes the node profile lists
    pub fn add_device(&self, mut object: Object) -> Result<()> {
        if object.is_profile() {
            return Err(Error::protocol(format!("{} is a profile, not a device", object.code())));
        }
        object.set_manufacturer_code(self.shared.config.manufacturer_code);
        object.attach_announcer(self.announcer());
        debug!("adding device {}", object.code());

        let mut objects = self.objects_mut();
        objects.add_device(object);
        refresh_node_profile(&mut objects);
        Ok(())
    }

    /// Adds a profile object and refreshes the node profile lists
    pub fn add_profile(&self, mut object: Object) -> Result<()> {
        if !object.is_profile() {
            return Err(Error::protocol(format!("{} is not a profile", object.code())));
        }
        object.set_manufacturer_code(self.shared.config.manufacturer_code);
        object.attach_announcer(self.announcer());
        debug!("adding profile {}", object.code());

        let mut objects = self.objects_mut();
        objects.add_profile(object);
        refresh_node_profile(&mut objects);
        Ok(())
    }

    /// Writes a manufacturer code to every object and regenerates the
    /// node's identification number
    pub fn set_manufacturer_code(&self, code: u32) {
        let mut objects = self.objects_mut();
        for object in objects.objects_mut() {
            object.set_manufacturer_code(code);
        }
        if let Some(profile) = objects.node_profile_mut() {
            profile.store_property_data(EPC_IDENTIFICATION_NUMBER, identification_number(code));
        }
    }

    /// Returns a copy of one property of one object
    pub fn property(&self, object: ObjectCode, code: u8) -> Option<Property> {
        self.objects().object(object).and_then(|o| o.property(code)).cloned()
    }

    /// Sets property data, announcing it when the property is announceable
    /// and the node is running
    pub fn set_property_data(&self, object: ObjectCode, code: u8, data: impl Into<bytes::Bytes>) -> Result<()> {
        let mut objects = self.objects_mut();
        let target = objects
            .object_mut(object)
            .ok_or_else(|| Error::protocol(format!("no object {}", object)))?;
        target.set_property_data(code, data)
    }

    /// Waits until the object holds a property with the given code
    ///
    /// This polls: the object collection is checked a fixed number of
    /// times, `timeout / retries` apart. Nothing wakes the caller early.
    /// The property is returned as soon as it exists, even if it holds
    /// no data yet.
    pub async fn find_property_wait(&self, object: ObjectCode, code: u8, timeout: Duration) -> Option<Property> {
        let interval = timeout / FIND_PROPERTY_RETRIES;
        for attempt in 0..=FIND_PROPERTY_RETRIES {
            if let Some(prop) = self.property(object, code) {
                return Some(prop);
            }
            if attempt < FIND_PROPERTY_RETRIES {
                tokio::time::sleep(interval).await;
            }
        }
        None
    }

    /// Registers the node listener, replacing any previous one
    pub fn set_listener(&self, listener: Arc<dyn NodeListener>) {
        *self.shared.listener.write().unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    fn listener(&self) -> Option<Arc<dyn NodeListener>> {
        self.shared.listener.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Advances and returns the transaction id
    pub fn next_tid(&self) -> u16 {
        self.shared.tid.next()
    }

    /// Most recently issued transaction id
    pub fn last_tid(&self) -> u16 {
        self.shared.tid.current()
    }

    fn transport(&self) -> Result<Arc<TransportManager>> {
        self.shared
            .transport
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| Error::invalid_state("node is not running"))
    }

    /// Bound unicast endpoints, empty while stopped
    pub fn unicast_addrs(&self) -> Vec<SocketAddr> {
        self.transport().map(|t| t.unicast_addrs()).unwrap_or_default()
    }

    /// Binds the transport, starts the dispatch tasks and announces the
    /// node's instance list
    pub async fn start(&self) -> Result<()> {
        self.shared.config.validate()?;
        {
            let mut state = lock(&self.shared.state);
            if *state != NodeState::Stopped {
                return Err(Error::invalid_state(format!("cannot start a node that is {}", state)));
            }
            *state = NodeState::Starting;
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let transport = match TransportManager::start(self.shared.config.transport.clone(), inbound_tx).await {
            Ok(transport) => Arc::new(transport),
            Err(e) => {
                error!("failed to start node: {}", e);
                *lock(&self.shared.state) = NodeState::Stopped;
                return Err(e);
            }
        };
        *self.shared.transport.write().unwrap_or_else(|e| e.into_inner()) = Some(transport.clone());

        let token = CancellationToken::new();
        *lock(&self.shared.token) = token.clone();
        let tasks = vec![
            tokio::spawn(self.clone().dispatch_loop(inbound_rx, token.clone())),
            tokio::spawn(self.clone().announce_loop(transport.clone(), token)),
        ];
        *lock(&self.shared.tasks) = tasks;

        self.shared.running.store(true, Ordering::SeqCst);
        *lock(&self.shared.state) = NodeState::Running;
        info!("node {} running on {:?}", self.node_profile_code(), transport.unicast_addrs());

        if let Err(e) = transport.send_multicast(&self.instance_list_notification()).await {
            warn!("start-up announcement failed: {}", e);
        }
        Ok(())
    }

    /// Closes every socket and stops the tasks; a stopped node is left as is
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = lock(&self.shared.state);
            match *state {
                NodeState::Stopped => return Ok(()),
                NodeState::Running => *state = NodeState::Stopping,
                other => return Err(Error::invalid_state(format!("cannot stop a node that is {}", other))),
            }
        }

        self.shared.running.store(false, Ordering::SeqCst);
        lock(&self.shared.token).cancel();
        let transport = self.shared.transport.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(transport) = transport {
            transport.stop().await;
        }
        let tasks = std::mem::take(&mut *lock(&self.shared.tasks));
        for task in tasks {
            let _ = task.await;
        }
        lock(&self.shared.pending).take();
        let discarded = self.discard_announcements().await;
        if discarded > 0 {
            debug!("discarded {} queued announcement(s)", discarded);
        }

        *lock(&self.shared.state) = NodeState::Stopped;
        info!("node {} stopped", self.node_profile_code());
        Ok(())
    }

    /// Instance list notification (0x73, EPC 0xD5) for the whole network
    pub fn instance_list_notification(&self) -> Message {
        let data = self
            .objects()
            .node_profile()
            .and_then(|p| p.property_data(EPC_INSTANCE_LIST_NOTIFICATION).cloned())
            .unwrap_or_default();
        Message::new(self.node_profile_code(), ObjectCode::NODE_PROFILE, Esv::NOTIFICATION)
            .with_tid(self.next_tid())
            .with_property(EPC_INSTANCE_LIST_NOTIFICATION, data)
    }

    /// Sends a frame unchanged to one endpoint
    pub async fn send_message(&self, message: &Message, to: SocketAddr) -> Result<()> {
        trace!("-> {}: {}", to, message);
        self.transport()?.send_unicast(message, to).await
    }

    /// Sends a frame unchanged to the multicast group
    pub async fn send_multicast(&self, message: &Message) -> Result<()> {
        trace!("-> multicast: {}", message);
        self.transport()?.send_multicast(message).await
    }

    /// Sends a request and waits for its response
    ///
    /// The request gets the next transaction id. Only one request is in
    /// flight per node: concurrent calls wait for their turn. With TCP
    /// enabled the request first goes over a dedicated connection; if that
    /// fails for any reason it is sent again over UDP.
    pub async fn post_message(&self, mut message: Message, to: SocketAddr) -> Result<Message> {
        let transport = self.transport()?;
        let _turn = self.shared.post_lock.lock().await;
        message.tid = self.next_tid();
        let wait = self.shared.config.request_timeout;

        if transport.config().tcp_enabled {
            match transport.post_tcp(&message, to, wait).await {
                Ok(response) => return Ok(response),
                Err(e) => debug!("TCP request to {} failed, falling back to UDP: {}", to, e),
            }
        }

        let (tx, rx) = oneshot::channel();
        *lock(&self.shared.pending) = Some(Pending {
            request: message.clone(),
            tx,
        });
        trace!("-> {}: {}", to, message);
        if let Err(e) = transport.send_unicast(&message, to).await {
            lock(&self.shared.pending).take();
            return Err(e);
        }

        let result = timeout(wait, rx).await;
        lock(&self.shared.pending).take();
        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::invalid_state("node stopped while waiting for a response")),
            Err(_) => Err(Error::Timeout(wait)),
        }
    }

    /// Hands a frame to the waiting `post_message`, if it answers it
    fn complete_pending(&self, message: &Message) -> bool {
        let mut pending = lock(&self.shared.pending);
        let matched = pending
            .as_ref()
            .map_or(false, |p| message.is_response_to(&p.request));
        if !matched {
            return false;
        }
        if let Some(p) = pending.take() {
            let _ = p.tx.send(message.clone());
        }
        true
    }

    /// Validates and applies a request for one of this node's objects and
    /// returns the answer to send, if any
    pub fn handle_message(&self, message: &Message) -> Option<Message> {
        let listener = self.listener();
        let mut objects = self.objects_mut();
        handle_request(&mut objects, message, listener.as_deref())
    }

    async fn dispatch_loop(self, mut inbound: mpsc::Receiver<Inbound>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                next = inbound.recv() => match next {
                    Some(frame) => {
                        let node = self.clone();
                        tokio::spawn(async move { node.process(frame).await });
                    }
                    None => break,
                },
            }
        }
    }

    /// Empties the announcement queue so nothing from this run is sent
    /// after a restart
    async fn discard_announcements(&self) -> usize {
        let mut rx = self.shared.announce_rx.lock().await;
        let mut discarded = 0;
        while rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }

    async fn announce_loop(self, transport: Arc<TransportManager>, token: CancellationToken) {
        let rx = self.shared.announce_rx.clone();
        let mut rx = rx.lock().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                next = rx.recv() => match next {
                    Some(message) => {
                        trace!("-> multicast: {}", message);
                        if let Err(e) = transport.send_multicast(&message).await {
                            warn!("announcement of {} failed: {}", message.seoj, e);
                        }
                    }
                    None => break,
                },
            }
        }
    }

    async fn process(&self, inbound: Inbound) {
        let Inbound { message, from, reply, .. } = inbound;
        let Ok(transport) = self.transport() else {
            return;
        };
        if !transport.config().self_message_enabled && transport.is_own_endpoint(&from) {
            trace!("dropping own frame {}", message);
            return;
        }
        trace!("<- {}: {}", from, message);

        if let Some(listener) = self.listener() {
            listener.message_received(&message, from);
        }
        if !message.esv.is_request() && self.complete_pending(&message) {
            return;
        }

        let Some(response) = self.handle_message(&message) else {
            return;
        };
        trace!("-> {}: {}", from, response);
        let sent = if response.esv == Esv::NOTIFICATION {
            transport.send_multicast(&response).await
        } else {
            transport.reply(&response, from, &reply).await
        };
        if let Err(e) = sent {
            warn!("failed to answer {}: {}", from, e);
        }
    }
}

fn refresh_node_profile(objects: &mut BaseNode) {
    let devices = objects.device_codes();
    if let Some(profile) = objects.node_profile_mut() {
        update_node_profile(profile, devices.into_iter());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TransportConfig;
    use crate::object::profile::{EPC_INSTANCE_COUNT, EPC_SELF_NODE_CLASS_LIST, EPC_SELF_NODE_INSTANCE_LIST};
    use crate::object::{Attribute, EPC_MANUFACTURER_CODE, EPC_OPERATING_STATUS};
    use crate::protocol::MessageProperty;
    use std::time::Instant;
    use tokio::net::UdpSocket;
    use tokio_test::{assert_err, assert_ok};

    const LIGHT: ObjectCode = ObjectCode::new(0x02, 0x90, 0x01);

    fn loopback_config() -> NodeConfig {
        NodeConfig {
            transport: TransportConfig::loopback(),
            request_timeout: Duration::from_millis(500),
            ..NodeConfig::default()
        }
    }

    fn light_node(config: NodeConfig) -> LocalNode {
        let node = LocalNode::new(config);
        let mut light = Object::device(LIGHT);
        light.add_property_with_data(0xB0, Attribute::READ_WRITE, vec![50]).unwrap();
        node.add_device(light).unwrap();
        node
    }

    /// Answers every request after `delay`, recording arrival times
    async fn slow_responder(delay: Duration) -> (SocketAddr, Arc<Mutex<Vec<Instant>>>) {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let arrivals = Arc::new(Mutex::new(Vec::new()));
        let seen = arrivals.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else { break };
                seen.lock().unwrap().push(Instant::now());
                let request = Message::decode(&buf[..len]).unwrap();
                let mut response = Message::response_to(&request).unwrap();
                response.add_property(MessageProperty::new(0x80, vec![0x30]));
                let socket = socket.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    socket.send_to(&response.encode().unwrap(), from).await.unwrap();
                });
            }
        });
        (addr, arrivals)
    }

    #[test]
    fn test_node_profile_follows_devices() {
        let node = light_node(NodeConfig::default());
        let objects = node.objects();
        let profile = objects.node_profile().unwrap();
        assert_eq!(profile.property_data(EPC_INSTANCE_COUNT).unwrap().as_ref(), &[0, 0, 1]);
        assert_eq!(profile.property_data(EPC_SELF_NODE_INSTANCE_LIST).unwrap().as_ref(), &[1, 0x02, 0x90, 0x01]);
        assert_eq!(profile.property_data(EPC_SELF_NODE_CLASS_LIST).unwrap().as_ref(), &[1, 0x02, 0x90]);
    }

    #[test]
    fn test_add_device_rejects_profiles() {
        let node = LocalNode::new(NodeConfig::default());
        assert!(node.add_device(Object::profile(0xF0, 0x01)).is_err());
        assert!(node.add_profile(Object::device(LIGHT)).is_err());
    }

    #[test]
    fn test_manufacturer_code_propagates() {
        let node = light_node(NodeConfig::default());
        node.set_manufacturer_code(0x000005);
        let objects = node.objects();
        assert!(objects.objects().all(|o| o.manufacturer_code() == Some(0x000005)));
        let id = objects.node_profile().unwrap().property_data(EPC_IDENTIFICATION_NUMBER).unwrap();
        assert_eq!(&id[..4], &[0xFE, 0x00, 0x00, 0x05]);
        drop(objects);
        assert_eq!(node.property(LIGHT, EPC_MANUFACTURER_CODE).unwrap().data().as_ref(), &[0, 0, 5]);
    }

    #[tokio::test]
    async fn test_stop_when_not_started() {
        let node = LocalNode::new(loopback_config());
        assert_ok!(node.stop().await);
        assert_eq!(node.state(), NodeState::Stopped);
        assert_err!(node.post_message(Message::read_request(ObjectCode::CONTROLLER, LIGHT, &[0x80]), "127.0.0.1:3610".parse().unwrap()).await);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let node = LocalNode::new(loopback_config());
        node.start().await.unwrap();
        assert_eq!(node.state(), NodeState::Running);
        assert!(node.is_running());
        assert_eq!(node.unicast_addrs().len(), 1);
        assert_err!(node.start().await);

        node.stop().await.unwrap();
        assert_eq!(node.state(), NodeState::Stopped);
        assert!(node.unicast_addrs().is_empty());

        // Restart binds again
        node.start().await.unwrap();
        node.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_post_message_between_nodes() {
        let server = light_node(loopback_config());
        server.start().await.unwrap();
        let client = LocalNode::new(loopback_config());
        client.start().await.unwrap();

        let to = server.unicast_addrs()[0];
        let request = Message::read_request(ObjectCode::CONTROLLER, LIGHT, &[EPC_OPERATING_STATUS, 0xB0]);
        let response = client.post_message(request, to).await.unwrap();
        assert_eq!(response.esv, Esv::READ_RESPONSE);
        assert_eq!(response.tid, client.last_tid());
        assert_eq!(response.property(0xB0).unwrap().data.as_ref(), &[50]);

        let write = Message::new(ObjectCode::CONTROLLER, LIGHT, Esv::WRITE_REQUEST_RESPONSE_REQUIRED)
            .with_property(0xB0, vec![75]);
        let response = client.post_message(write, to).await.unwrap();
        assert_eq!(response.esv, Esv::WRITE_RESPONSE);
        assert_eq!(server.property(LIGHT, 0xB0).unwrap().data().as_ref(), &[75]);

        let missing = Message::read_request(ObjectCode::CONTROLLER, LIGHT, &[0xF0]);
        let response = client.post_message(missing, to).await.unwrap();
        assert_eq!(response.esv, Esv::READ_REQUEST_ERROR);

        client.stop().await.unwrap();
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_post_message_timeout() {
        let node = LocalNode::new(loopback_config());
        node.start().await.unwrap();
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let request = Message::read_request(ObjectCode::CONTROLLER, LIGHT, &[0x80]);
        let err = node.post_message(request, silent.local_addr().unwrap()).await.unwrap_err();
        assert!(err.is_timeout());
        node.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_post_message_serialized() {
        let node = LocalNode::new(loopback_config());
        node.start().await.unwrap();
        let delay = Duration::from_millis(150);
        let (addr, arrivals) = slow_responder(delay).await;

        let first = node.post_message(Message::read_request(ObjectCode::CONTROLLER, LIGHT, &[0x80]), addr);
        let second = node.post_message(Message::read_request(ObjectCode::CONTROLLER, LIGHT, &[0x80]), addr);
        let (first, second) = tokio::join!(first, second);
        assert_ne!(first.unwrap().tid, second.unwrap().tid);

        let arrivals = arrivals.lock().unwrap();
        assert_eq!(arrivals.len(), 2);
        assert!(arrivals[1].duration_since(arrivals[0]) >= delay);
        drop(arrivals);
        node.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_failure_falls_back_to_udp() {
        let mut config = loopback_config();
        config.transport.tcp_enabled = true;
        config.transport.tcp_connect_timeout = Duration::from_millis(200);
        let node = LocalNode::new(config);
        node.start().await.unwrap();

        // UDP only: the TCP connect is refused
        let (addr, arrivals) = slow_responder(Duration::ZERO).await;
        let response = node
            .post_message(Message::read_request(ObjectCode::CONTROLLER, LIGHT, &[0x80]), addr)
            .await
            .unwrap();
        assert_eq!(response.esv, Esv::READ_RESPONSE);
        assert_eq!(arrivals.lock().unwrap().len(), 1);
        node.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_post_message_over_tcp() {
        let mut config = loopback_config();
        config.transport.tcp_enabled = true;
        let server = light_node(config.clone());
        server.start().await.unwrap();
        let client = LocalNode::new(config);
        client.start().await.unwrap();

        let to = server.unicast_addrs()[0];
        let response = client
            .post_message(Message::read_request(ObjectCode::CONTROLLER, LIGHT, &[0xB0]), to)
            .await
            .unwrap();
        assert_eq!(response.property(0xB0).unwrap().data.as_ref(), &[50]);

        client.stop().await.unwrap();
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_find_property_wait_polls() {
        let node = light_node(NodeConfig::default());
        assert!(node.find_property_wait(LIGHT, 0xB1, Duration::from_millis(50)).await.is_none());

        let writer = node.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer.objects_mut().object_mut(LIGHT).unwrap().add_property(0xB1, Attribute::READ).unwrap();
        });
        let prop = node.find_property_wait(LIGHT, 0xB1, Duration::from_millis(500)).await.unwrap();
        assert_eq!(prop.code(), 0xB1);
        assert_eq!(prop.size(), 0);
    }

    #[tokio::test]
    async fn test_stop_discards_queued_announcements() {
        let node = LocalNode::new(loopback_config());
        for _ in 0..2 {
            node.shared.announce_tx.send(node.instance_list_notification()).unwrap();
        }
        assert_eq!(node.discard_announcements().await, 2);

        let mut light = Object::device(LIGHT);
        light.set_property_attribute(EPC_OPERATING_STATUS, Attribute::READ_WRITE_ANNOUNCE).unwrap();
        node.add_device(light).unwrap();
        node.start().await.unwrap();
        node.set_property_data(LIGHT, EPC_OPERATING_STATUS, vec![0x30]).unwrap();
        node.stop().await.unwrap();

        // Either sent before the stop or dropped by it, never left for the next run
        assert!(node.shared.announce_rx.lock().await.try_recv().is_err());
    }
}
