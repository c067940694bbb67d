//! Protocol implementation module
//! 
//! This module defines the ECHONET Lite frame, its service codes and the
//! encoding/decoding of the fixed "format 1" layout.

pub mod codec;
pub mod esv;
pub mod message;

pub use self::codec::MessageCodec;
pub use self::esv::Esv;
pub use self::message::{Message, MessageProperty};
