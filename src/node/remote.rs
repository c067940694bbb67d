use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::object::profile::{decode_instance_list, EPC_INSTANCE_LIST_NOTIFICATION, EPC_SELF_NODE_INSTANCE_LIST};
use crate::object::Object;
use crate::protocol::{Esv, Message};
use crate::standard::StandardDatabase;
use super::BaseNode;

/// A peer node found on the network
///
/// Two remote nodes are equal when they share address and port, whatever
/// objects they were found with.
#[derive(Debug, Clone)]
pub struct RemoteNode {
    addr: IpAddr,
    port: u16,
    node: BaseNode,
}

impl RemoteNode {
    /// Creates a node without objects
    pub fn new(addr: SocketAddr) -> Self {
        RemoteNode {
            addr: addr.ip(),
            port: addr.port(),
            node: BaseNode::new(),
        }
    }

    /// Builds a node from an instance list sent by its node profile
    ///
    /// Accepts notifications and read responses carrying 0xD6 or 0xD5.
    /// Every listed code becomes a stub object populated from the
    /// database's class template, next to a stub of the sending profile.
    pub fn from_message(from: SocketAddr, message: &Message, database: &StandardDatabase) -> Option<Self> {
        if !message.seoj.is_node_profile() || !is_instance_list_carrier(message.esv) {
            return None;
        }
        let data = message
            .property(EPC_SELF_NODE_INSTANCE_LIST)
            .or_else(|| message.property(EPC_INSTANCE_LIST_NOTIFICATION))
            .filter(|p| p.pdc() > 0)?
            .data
            .clone();

        let mut node = RemoteNode::new(from);
        node.node.add_object(database.create_object(message.seoj));
        for code in decode_instance_list(&data) {
            node.node.add_object(database.create_object(code));
        }
        Some(node)
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Endpoint requests to this node go to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }

    /// The node's objects
    pub fn node(&self) -> &BaseNode {
        &self.node
    }

    pub fn devices(&self) -> &[Object] {
        self.node.devices()
    }

    pub fn profiles(&self) -> &[Object] {
        self.node.profiles()
    }

    /// Returns the object with the given code
    pub fn object(&self, code: crate::core::ObjectCode) -> Option<&Object> {
        self.node.object(code)
    }
}

fn is_instance_list_carrier(esv: Esv) -> bool {
    matches!(
        esv,
        Esv::NOTIFICATION | Esv::NOTIFICATION_RESPONSE_REQUIRED | Esv::READ_RESPONSE
    )
}

impl PartialEq for RemoteNode {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr && self.port == other.port
    }
}

impl Eq for RemoteNode {}

impl fmt::Display for RemoteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.socket_addr())?;
        for (i, object) in self.node.objects().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", object.code())?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ObjectCode;

    fn notification(data: Vec<u8>) -> Message {
        Message::new(ObjectCode::NODE_PROFILE, ObjectCode::NODE_PROFILE, Esv::NOTIFICATION)
            .with_property(EPC_INSTANCE_LIST_NOTIFICATION, data)
    }

    #[test]
    fn test_from_instance_list() {
        let from: SocketAddr = "192.168.1.20:3610".parse().unwrap();
        let msg = notification(vec![2, 0x02, 0x90, 0x01, 0x01, 0x30, 0x01]);
        let node = RemoteNode::from_message(from, &msg, &StandardDatabase::new()).unwrap();
        assert_eq!(node.socket_addr(), from);
        assert_eq!(node.devices().len(), 2);
        assert_eq!(node.profiles().len(), 1);
        assert!(node.object(ObjectCode::new(0x01, 0x30, 0x01)).is_some());
        assert_eq!(node.to_string(), "192.168.1.20:3610 (0EF001, 029001, 013001)");
    }

    #[test]
    fn test_ignores_other_messages() {
        let from: SocketAddr = "192.168.1.20:3610".parse().unwrap();
        let db = StandardDatabase::new();

        let mut msg = notification(vec![1, 0x02, 0x90, 0x01]);
        msg.seoj = ObjectCode::new(0x02, 0x90, 0x01);
        assert!(RemoteNode::from_message(from, &msg, &db).is_none());

        let mut msg = notification(vec![1, 0x02, 0x90, 0x01]);
        msg.esv = Esv::READ_REQUEST_ERROR;
        assert!(RemoteNode::from_message(from, &msg, &db).is_none());

        // Error response entries carry no data
        let msg = Message::new(ObjectCode::NODE_PROFILE, ObjectCode::CONTROLLER, Esv::READ_RESPONSE)
            .with_property(EPC_SELF_NODE_INSTANCE_LIST, Vec::new());
        assert!(RemoteNode::from_message(from, &msg, &db).is_none());
    }

    #[test]
    fn test_equality_is_by_endpoint() {
        let from: SocketAddr = "192.168.1.20:3610".parse().unwrap();
        let db = StandardDatabase::new();
        let a = RemoteNode::from_message(from, &notification(vec![1, 0x02, 0x90, 0x01]), &db).unwrap();
        let b = RemoteNode::from_message(from, &notification(vec![0]), &db).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, RemoteNode::new("192.168.1.20:3611".parse().unwrap()));
    }
}
