//! Controller
//!
//! A local node that searches the network for other nodes, keeps the ones
//! it finds and sends them requests.

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info};

use crate::core::{ClassCode, NodeConfig, ObjectCode, Result};
use crate::node::{LocalNode, NodeListener, RemoteNode};
use crate::object::profile::EPC_SELF_NODE_INSTANCE_LIST;
use crate::object::{Object, EPC_OPERATING_STATUS};
use crate::protocol::Message;
use crate::standard::StandardDatabase;

/// Controller callbacks
///
/// Both run on the node's dispatch tasks.
pub trait ControllerListener: Send + Sync {
    /// Every frame the controller receives
    fn message_received(&self, _message: &Message, _from: SocketAddr) {}

    /// A node seen for the first time
    fn node_found(&self, node: &RemoteNode);
}

/// Discovery state, shared with the node as its listener
struct Discovery {
    database: Arc<StandardDatabase>,
    nodes: RwLock<Vec<RemoteNode>>,
    listener: RwLock<Option<Arc<dyn ControllerListener>>>,
}

impl Discovery {
    fn listener(&self) -> Option<Arc<dyn ControllerListener>> {
        self.listener.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Records a node unless one with the same endpoint is known; returns
    /// true for a new node
    fn add_node(&self, node: RemoteNode) -> bool {
        let mut nodes = self.nodes.write().unwrap_or_else(|e| e.into_inner());
        if nodes.contains(&node) {
            return false;
        }
        nodes.push(node);
        true
    }
}

impl NodeListener for Discovery {
    fn message_received(&self, message: &Message, from: SocketAddr) {
        let listener = self.listener();
        if let Some(l) = &listener {
            l.message_received(message, from);
        }

        let Some(node) = RemoteNode::from_message(from, message, &self.database) else {
            return;
        };
        if !self.add_node(node.clone()) {
            return;
        }
        info!("found node {}", node);
        if let Some(l) = &listener {
            l.node_found(&node);
        }
    }
}

/// A node that discovers and talks to other nodes
pub struct Controller {
    node: LocalNode,
    discovery: Arc<Discovery>,
}

impl Controller {
    /// Creates a stopped controller holding the controller object 0x05FF01
    pub fn new(config: NodeConfig, database: Arc<StandardDatabase>) -> Result<Self> {
        let node = LocalNode::new(config);
        node.add_device(Object::device(ObjectCode::CONTROLLER))?;
        let discovery = Arc::new(Discovery {
            database,
            nodes: RwLock::new(Vec::new()),
            listener: RwLock::new(None),
        });
        node.set_listener(discovery.clone());
        Ok(Controller { node, discovery })
    }

    /// The underlying local node
    pub fn node(&self) -> &LocalNode {
        &self.node
    }

    /// The standard database objects are stubbed from
    pub fn database(&self) -> &StandardDatabase {
        &self.discovery.database
    }

    /// Registers the controller listener, replacing any previous one
    pub fn set_listener(&self, listener: Arc<dyn ControllerListener>) {
        *self.discovery.listener.write().unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    pub async fn start(&self) -> Result<()> {
        self.node.start().await
    }

    pub async fn stop(&self) -> Result<()> {
        self.node.stop().await
    }

    /// Multicasts a read of every node profile's instance list
    pub async fn search_all_objects(&self) -> Result<()> {
        let message = Message::read_request(ObjectCode::CONTROLLER, ObjectCode::NODE_PROFILE, &[
            EPC_SELF_NODE_INSTANCE_LIST,
        ])
        .with_tid(self.node.next_tid());
        debug!("searching all objects, TID {:04X}", message.tid);
        self.node.send_multicast(&message).await
    }

    /// Multicasts a read of the operation status of every instance of a class
    pub async fn search_object(&self, class: ClassCode) -> Result<()> {
        let message = Message::read_request(ObjectCode::CONTROLLER, class.instance(0), &[EPC_OPERATING_STATUS])
            .with_tid(self.node.next_tid());
        debug!("searching class {}, TID {:04X}", class, message.tid);
        self.node.send_multicast(&message).await
    }

    /// Searches, waits and returns every node known afterwards
    pub async fn discover_nodes(&self, wait: Duration) -> Result<Vec<RemoteNode>> {
        self.search_all_objects().await?;
        tokio::time::sleep(wait).await;
        Ok(self.nodes())
    }

    /// Nodes found so far, in discovery order
    pub fn nodes(&self) -> Vec<RemoteNode> {
        self.discovery.nodes.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Returns the found node at `addr`
    pub fn find_node(&self, addr: SocketAddr) -> Option<RemoteNode> {
        self.discovery
            .nodes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|n| n.socket_addr() == addr)
            .cloned()
    }

    /// Sends a request to a node and waits for its response
    pub async fn post_message(&self, node: &RemoteNode, message: Message) -> Result<Message> {
        self.node.post_message(message, node.socket_addr()).await
    }

    /// Transaction id of the last frame sent
    pub fn last_tid(&self) -> u16 {
        self.node.last_tid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TransportConfig;
    use crate::object::profile::EPC_INSTANCE_LIST_NOTIFICATION;
    use crate::object::Attribute;
    use crate::protocol::Esv;
    use crate::standard::ObjectTemplate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        messages: AtomicUsize,
        found: AtomicUsize,
    }

    impl ControllerListener for Counter {
        fn message_received(&self, _message: &Message, _from: SocketAddr) {
            self.messages.fetch_add(1, Ordering::SeqCst);
        }

        fn node_found(&self, _node: &RemoteNode) {
            self.found.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn loopback_config() -> NodeConfig {
        NodeConfig {
            transport: TransportConfig::loopback(),
            request_timeout: Duration::from_millis(500),
            ..NodeConfig::default()
        }
    }

    fn controller() -> Controller {
        let mut db = StandardDatabase::new();
        db.add_object(
            ObjectTemplate::new(ClassCode::new(0x02, 0x90), "General lighting")
                .with_property(0xB0, Attribute::READ_WRITE, "Illuminance level"),
        );
        Controller::new(loopback_config(), Arc::new(db)).unwrap()
    }

    fn instance_list(esv: Esv, epc: u8) -> Message {
        Message::new(ObjectCode::NODE_PROFILE, ObjectCode::NODE_PROFILE, esv)
            .with_property(epc, vec![1, 0x02, 0x90, 0x01])
    }

    #[test]
    fn test_controller_object() {
        let controller = controller();
        let objects = controller.node().objects();
        assert!(objects.has_object(ObjectCode::CONTROLLER));
        let profile = objects.node_profile().unwrap();
        assert_eq!(profile.property_data(EPC_SELF_NODE_INSTANCE_LIST).unwrap().as_ref(), &[1, 0x05, 0xFF, 0x01]);
    }

    #[test]
    fn test_discovery_dedup() {
        let controller = controller();
        let counter = Arc::new(Counter::default());
        controller.set_listener(counter.clone());
        let from: SocketAddr = "192.168.1.20:3610".parse().unwrap();

        let msg = instance_list(Esv::NOTIFICATION, EPC_INSTANCE_LIST_NOTIFICATION);
        controller.discovery.message_received(&msg, from);
        controller.discovery.message_received(&msg, from);
        assert_eq!(controller.nodes().len(), 1);
        assert_eq!(counter.found.load(Ordering::SeqCst), 1);
        assert_eq!(counter.messages.load(Ordering::SeqCst), 2);

        // Another port is another node
        let other: SocketAddr = "192.168.1.20:3611".parse().unwrap();
        controller.discovery.message_received(&instance_list(Esv::READ_RESPONSE, EPC_SELF_NODE_INSTANCE_LIST), other);
        assert_eq!(controller.nodes().len(), 2);
        assert_eq!(counter.found.load(Ordering::SeqCst), 2);

        let node = controller.find_node(from).unwrap();
        let light = node.object(ObjectCode::new(0x02, 0x90, 0x01)).unwrap();
        assert!(light.has_property(0xB0));
        assert!(controller.find_node("10.0.0.1:3610".parse().unwrap()).is_none());
    }

    #[test]
    fn test_first_seen_wins() {
        let controller = controller();
        let from: SocketAddr = "192.168.1.20:3610".parse().unwrap();
        controller.discovery.message_received(&instance_list(Esv::NOTIFICATION, EPC_INSTANCE_LIST_NOTIFICATION), from);
        let update = Message::new(ObjectCode::NODE_PROFILE, ObjectCode::NODE_PROFILE, Esv::NOTIFICATION)
            .with_property(EPC_INSTANCE_LIST_NOTIFICATION, vec![1, 0x01, 0x30, 0x01]);
        controller.discovery.message_received(&update, from);

        let node = controller.find_node(from).unwrap();
        assert!(node.object(ObjectCode::new(0x02, 0x90, 0x01)).is_some());
        assert!(node.object(ObjectCode::new(0x01, 0x30, 0x01)).is_none());
    }

    #[test]
    fn test_unknown_object_gets_no_response() {
        let controller = controller();
        let request = Message::read_request(ObjectCode::CONTROLLER, ObjectCode::new(0x02, 0x90, 0x01), &[0x80]);
        assert!(controller.node().handle_message(&request).is_none());

        let request = Message::read_request(ObjectCode::CONTROLLER, ObjectCode::NODE_PROFILE, &[0xF0]);
        let response = controller.node().handle_message(&request).unwrap();
        assert_eq!(response.esv, Esv::READ_REQUEST_ERROR);
    }

    #[tokio::test]
    async fn test_discover_and_post() {
        let device = LocalNode::new(loopback_config());
        let mut light = Object::device(ObjectCode::new(0x02, 0x90, 0x01));
        light.add_property_with_data(0xB0, Attribute::READ_WRITE, vec![50]).unwrap();
        device.add_device(light).unwrap();
        device.start().await.unwrap();

        let controller = controller();
        controller.start().await.unwrap();

        // Without multicast on loopback, ask the device directly
        let to = device.unicast_addrs()[0];
        let request = Message::read_request(ObjectCode::CONTROLLER, ObjectCode::NODE_PROFILE, &[EPC_SELF_NODE_INSTANCE_LIST]);
        let response = controller.node().post_message(request, to).await.unwrap();
        assert_eq!(response.esv, Esv::READ_RESPONSE);
        assert_eq!(response.tid, controller.last_tid());

        let node = controller.find_node(to).unwrap();
        let response = controller
            .post_message(&node, Message::read_request(ObjectCode::CONTROLLER, ObjectCode::new(0x02, 0x90, 0x01), &[0xB0]))
            .await
            .unwrap();
        assert_eq!(response.property(0xB0).unwrap().data.as_ref(), &[50]);

        controller.stop().await.unwrap();
        device.stop().await.unwrap();
    }
}
