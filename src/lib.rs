//! ECHONET Lite: a protocol engine for discovering and controlling
//! smart-home devices on a LAN
//!
//! This library implements the fixed "format 1" ECHONET Lite frame, the
//! object and property model with its property maps, local nodes that
//! answer requests over multicast, unicast UDP and TCP, and a controller
//! that discovers remote nodes and correlates requests with responses.
pub mod core;

pub mod controller;
pub mod network;
pub mod node;
pub mod object;
pub mod protocol;
pub mod standard;
pub mod util;

// Re-export commonly used items
pub use crate::controller::{Controller, ControllerListener};
pub use crate::core::{ClassCode, Error, NodeConfig, ObjectCode, Result, TransportConfig};
pub use crate::node::{LocalNode, NodeListener, NodeState, RemoteNode};
pub use crate::object::{Attribute, Object, ObjectListener, Property, PropertyMap};
pub use crate::protocol::{Esv, Message, MessageProperty};
pub use crate::standard::StandardDatabase;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
