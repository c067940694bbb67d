//! Core types and constants for the ECHONET Lite engine
//! 
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

use std::net::Ipv4Addr;

pub use self::error::{Error, Result};
pub use self::types::{
    ClassCode,
    NodeConfig,
    ObjectCode,
    TidCounter,
    TransportConfig,
};

/// Default UDP/TCP port for ECHONET Lite
pub const DEFAULT_PORT: u16 = 3610;

/// ECHONET Lite multicast group
pub const MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 23, 0);

/// Maximum datagram size in bytes
pub const MAX_PACKET_SIZE: usize = 65507; // Maximum UDP payload size

/// Class group shared by all profile objects
pub const PROFILE_CLASS_GROUP: u8 = 0x0E;

/// Manufacturer code reserved for experimental use
pub const MANUFACTURER_EXPERIMENTAL: u32 = 0xFFFFFF;
