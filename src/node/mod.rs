//! Node abstraction
//!
//! A node is a set of device and profile objects reachable at one address.
//! `LocalNode` owns the transport and answers requests for its objects;
//! `RemoteNode` describes a peer found through discovery.

mod handler;
mod local;
mod remote;

pub use self::local::LocalNode;
pub use self::remote::RemoteNode;

use std::fmt;
use std::net::SocketAddr;

use crate::core::ObjectCode;
use crate::object::Object;
use crate::protocol::{Esv, Message, MessageProperty};

/// Lifecycle of a local node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// No socket is bound
    Stopped,
    /// Binding sockets
    Starting,
    /// Receiving and answering frames
    Running,
    /// Closing sockets
    Stopping,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Stopped => "stopped",
            NodeState::Starting => "starting",
            NodeState::Running => "running",
            NodeState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Node level callbacks
///
/// Invoked from the node's dispatch tasks. `property_request_received` runs
/// with the object collection locked and must not call back into the node.
pub trait NodeListener: Send + Sync {
    /// Every frame that passed the self-message filter
    fn message_received(&self, message: &Message, from: SocketAddr);

    /// A validated request property, after the object accepted it
    fn property_request_received(&self, _object: ObjectCode, _esv: Esv, _property: &MessageProperty) {}
}

/// Device and profile objects of a node, unique by object code
#[derive(Debug, Clone, Default)]
pub struct BaseNode {
    devices: Vec<Object>,
    profiles: Vec<Object>,
}

impl BaseNode {
    /// Creates a node without objects
    pub fn new() -> Self {
        BaseNode::default()
    }

    /// Adds a device, replacing one with the same code
    pub fn add_device(&mut self, object: Object) {
        upsert(&mut self.devices, object);
    }

    /// Adds a profile, replacing one with the same code
    pub fn add_profile(&mut self, object: Object) {
        upsert(&mut self.profiles, object);
    }

    /// Adds an object to the device or profile list by its class group
    pub fn add_object(&mut self, object: Object) {
        if object.is_profile() {
            self.add_profile(object);
        } else {
            self.add_device(object);
        }
    }

    pub fn devices(&self) -> &[Object] {
        &self.devices
    }

    pub fn profiles(&self) -> &[Object] {
        &self.profiles
    }

    /// Profiles first, then devices
    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.profiles.iter().chain(self.devices.iter())
    }

    /// Number of objects
    pub fn object_count(&self) -> usize {
        self.devices.len() + self.profiles.len()
    }

    /// Returns the object with the given code
    ///
    /// Instance code 0 addresses the class as a whole and resolves to its
    /// first instance.
    pub fn object(&self, code: ObjectCode) -> Option<&Object> {
        self.objects().find(|o| matches_code(o.code(), code))
    }

    /// Mutable variant of [`BaseNode::object`]
    pub fn object_mut(&mut self, code: ObjectCode) -> Option<&mut Object> {
        self.profiles
            .iter_mut()
            .chain(self.devices.iter_mut())
            .find(|o| matches_code(o.code(), code))
    }

    /// Returns true if an object with the given code exists
    pub fn has_object(&self, code: ObjectCode) -> bool {
        self.object(code).is_some()
    }

    /// Returns the node profile object, if any
    pub fn node_profile(&self) -> Option<&Object> {
        self.profiles.iter().find(|o| o.is_node_profile())
    }

    pub(crate) fn node_profile_mut(&mut self) -> Option<&mut Object> {
        self.profiles.iter_mut().find(|o| o.is_node_profile())
    }

    pub(crate) fn objects_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.profiles.iter_mut().chain(self.devices.iter_mut())
    }

    /// Device codes in insertion order
    pub fn device_codes(&self) -> Vec<ObjectCode> {
        self.devices.iter().map(Object::code).collect()
    }
}

fn upsert(list: &mut Vec<Object>, object: Object) {
    match list.iter_mut().find(|o| o.code() == object.code()) {
        Some(slot) => *slot = object,
        None => list.push(object),
    }
}

fn matches_code(object: ObjectCode, wanted: ObjectCode) -> bool {
    if wanted.instance() == 0 {
        object.class() == wanted.class()
    } else {
        object == wanted
    }
}
