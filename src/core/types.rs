use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A 3-byte ECHONET object code: class group, class code and instance code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectCode(u32);

impl ObjectCode {
    /// Super object code (no concrete class)
    pub const SUPER: ObjectCode = ObjectCode(0x000000);
    /// General node profile
    pub const NODE_PROFILE: ObjectCode = ObjectCode(0x0EF001);
    /// Transmission-only node profile
    pub const NODE_PROFILE_READ_ONLY: ObjectCode = ObjectCode(0x0EF002);
    /// Default controller object
    pub const CONTROLLER: ObjectCode = ObjectCode(0x05FF01);

    /// Builds an object code from its three components
    pub const fn new(class_group: u8, class_code: u8, instance: u8) -> Self {
        ObjectCode(((class_group as u32) << 16) | ((class_code as u32) << 8) | instance as u32)
    }

    /// Builds an object code from the low 24 bits of `value`
    pub const fn from_u32(value: u32) -> Self {
        ObjectCode(value & 0x00FF_FFFF)
    }

    /// Builds an object code from its wire form
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        ObjectCode::new(bytes[0], bytes[1], bytes[2])
    }

    /// Returns the wire form
    pub const fn to_bytes(self) -> [u8; 3] {
        [self.class_group(), self.class_code(), self.instance()]
    }

    /// Returns the code as an integer
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns the class group code
    pub const fn class_group(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Returns the class code
    pub const fn class_code(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Returns the instance code
    pub const fn instance(self) -> u8 {
        self.0 as u8
    }

    /// Returns the class part (group and class) of this code
    pub const fn class(self) -> ClassCode {
        ClassCode::new(self.class_group(), self.class_code())
    }

    /// Returns true if this is a profile object (class group 0x0E)
    pub const fn is_profile(self) -> bool {
        self.class_group() == super::PROFILE_CLASS_GROUP
    }

    /// Returns true if this is one of the two node profile codes
    pub const fn is_node_profile(self) -> bool {
        self.0 == Self::NODE_PROFILE.0 || self.0 == Self::NODE_PROFILE_READ_ONLY.0
    }
}

impl fmt::Display for ObjectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.0)
    }
}

impl From<[u8; 3]> for ObjectCode {
    fn from(bytes: [u8; 3]) -> Self {
        ObjectCode::from_bytes(bytes)
    }
}

/// A 2-byte ECHONET class code (class group and class)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassCode(u16);

impl ClassCode {
    /// Node profile class
    pub const NODE_PROFILE: ClassCode = ClassCode(0x0EF0);

    /// Builds a class code from group and class
    pub const fn new(class_group: u8, class_code: u8) -> Self {
        ClassCode(((class_group as u16) << 8) | class_code as u16)
    }

    /// Returns the class group code
    pub const fn class_group(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Returns the class code
    pub const fn class_code(self) -> u8 {
        self.0 as u8
    }

    /// Returns the object code of the given instance of this class
    pub const fn instance(self, instance: u8) -> ObjectCode {
        ObjectCode::new(self.class_group(), self.class_code(), instance)
    }

    /// Returns the wire form
    pub const fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Wrapping transaction id counter
///
/// `next()` advances first and then returns, so a counter sitting at
/// 65535 yields 0.
#[derive(Debug, Default)]
pub struct TidCounter(AtomicU16);

impl TidCounter {
    /// Creates a counter whose first `next()` returns `last + 1`
    pub fn new(last: u16) -> Self {
        TidCounter(AtomicU16::new(last))
    }

    /// Creates a counter starting at a random position
    pub fn random() -> Self {
        TidCounter::new(rand::random())
    }

    /// Returns the next transaction id
    pub fn next(&self) -> u16 {
        self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    /// Returns the most recently issued transaction id
    pub fn current(&self) -> u16 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Transport configuration shared by the multicast, UDP and TCP servers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// UDP/TCP port to bind
    pub port: u16,
    /// ECHONET Lite multicast group
    pub multicast_group: Ipv4Addr,
    /// Interfaces to bind; empty means every suitable interface
    pub interfaces: Vec<Ipv4Addr>,
    /// Join the multicast group and accept multicast traffic
    pub multicast_enabled: bool,
    /// Open a TCP listener per interface and try TCP first in `post_message`
    pub tcp_enabled: bool,
    /// Accept frames sent from this node's own endpoints
    pub self_message_enabled: bool,
    /// Bind attempts per socket before giving up (or stepping the port)
    pub bind_retry_count: usize,
    /// Wait between bind attempts
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub bind_retry_wait: Duration,
    /// Step to the next port when the configured unicast port is busy
    pub auto_port_binding: bool,
    /// Number of ports tried when `auto_port_binding` is on
    pub port_step_limit: u16,
    /// Timeout for establishing a TCP connection
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub tcp_connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            port: super::DEFAULT_PORT,
            multicast_group: super::MULTICAST_ADDR,
            interfaces: Vec::new(),
            multicast_enabled: true,
            tcp_enabled: false,
            self_message_enabled: false,
            bind_retry_count: 5,
            bind_retry_wait: Duration::from_millis(500),
            auto_port_binding: false,
            port_step_limit: 10,
            tcp_connect_timeout: Duration::from_secs(2),
        }
    }
}

impl TransportConfig {
    /// Loopback-only, unicast-only configuration on an ephemeral port
    pub fn loopback() -> Self {
        TransportConfig {
            port: 0,
            interfaces: vec![Ipv4Addr::LOCALHOST],
            multicast_enabled: false,
            bind_retry_count: 1,
            ..Default::default()
        }
    }

    /// Checks values the transport cannot work with
    pub fn validate(&self) -> super::Result<()> {
        if !self.multicast_group.is_multicast() {
            return Err(super::Error::config(format!(
                "{} is not a multicast group",
                self.multicast_group
            )));
        }
        if self.interfaces.iter().any(|addr| addr.is_multicast()) {
            return Err(super::Error::config("interface address is a multicast address"));
        }
        Ok(())
    }
}

/// Configuration for a local node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Transport settings
    pub transport: TransportConfig,
    /// How long `post_message` waits for the response
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub request_timeout: Duration,
    /// Manufacturer code written to every object of the node
    pub manufacturer_code: u32,
    /// Start the transaction id counter at a random value
    pub random_initial_tid: bool,
    /// Use the transmission-only node profile (0x0EF002)
    pub read_only_profile: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            transport: TransportConfig::default(),
            request_timeout: Duration::from_secs(3),
            manufacturer_code: super::MANUFACTURER_EXPERIMENTAL,
            random_initial_tid: false,
            read_only_profile: false,
        }
    }
}

impl NodeConfig {
    /// Checks the node and transport settings
    pub fn validate(&self) -> super::Result<()> {
        if self.manufacturer_code > 0xFF_FFFF {
            return Err(super::Error::config(format!(
                "manufacturer code {:X} does not fit in 3 bytes",
                self.manufacturer_code
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(super::Error::config("request timeout must be positive"));
        }
        self.transport.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_code_parts() {
        let code = ObjectCode::from_bytes([0x01, 0x30, 0x02]);
        assert_eq!(code.value(), 0x013002);
        assert_eq!(code.class_group(), 0x01);
        assert_eq!(code.class_code(), 0x30);
        assert_eq!(code.instance(), 0x02);
        assert_eq!(code.to_bytes(), [0x01, 0x30, 0x02]);
        assert_eq!(code.class(), ClassCode::new(0x01, 0x30));
        assert_eq!(code.to_string(), "013002");
    }

    #[test]
    fn test_profile_codes() {
        assert!(ObjectCode::NODE_PROFILE.is_profile());
        assert!(ObjectCode::NODE_PROFILE.is_node_profile());
        assert!(ObjectCode::NODE_PROFILE_READ_ONLY.is_node_profile());
        assert!(!ObjectCode::new(0x0E, 0xF0, 0x03).is_node_profile());
        assert!(!ObjectCode::CONTROLLER.is_profile());
        assert_eq!(ObjectCode::NODE_PROFILE.class(), ClassCode::NODE_PROFILE);
    }

    #[test]
    fn test_tid_wraparound() {
        let tid = TidCounter::new(65534);
        assert_eq!(tid.next(), 65535);
        assert_eq!(tid.current(), 65535);
        assert_eq!(tid.next(), 0);
        assert_eq!(tid.next(), 1);
    }

    #[test]
    fn test_config_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.transport.port, 3610);
        assert_eq!(config.transport.multicast_group, Ipv4Addr::new(224, 0, 23, 0));
        assert!(config.transport.multicast_enabled);
        assert!(!config.transport.tcp_enabled);
        assert_eq!(config.manufacturer_code, 0xFFFFFF);
    }

    #[test]
    fn test_config_json() {
        let mut config = NodeConfig::default();
        config.transport.tcp_enabled = true;
        config.request_timeout = Duration::from_millis(1500);

        let json = serde_json::to_string(&config).unwrap();
        let decoded: NodeConfig = serde_json::from_str(&json).unwrap();
        assert!(decoded.transport.tcp_enabled);
        assert_eq!(decoded.request_timeout, Duration::from_millis(1500));

        // Missing fields fall back to defaults
        let partial: NodeConfig = serde_json::from_str(r#"{"manufacturer_code": 11}"#).unwrap();
        assert_eq!(partial.manufacturer_code, 11);
        assert_eq!(partial.transport.port, 3610);
    }

    #[test]
    fn test_config_validation() {
        assert!(NodeConfig::default().validate().is_ok());

        let config = NodeConfig {
            manufacturer_code: 0x1000000,
            ..NodeConfig::default()
        };
        assert!(matches!(config.validate(), Err(crate::core::Error::Config(_))));

        let mut config = NodeConfig::default();
        config.transport.multicast_group = Ipv4Addr::new(192, 168, 0, 1);
        assert!(config.validate().is_err());
    }
}
