use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::core::ObjectCode;
use crate::object::Object;
use crate::protocol::{Esv, Message, MessageProperty};
use super::{BaseNode, NodeListener};

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refusal {
    MissingProperty(u8),
    ServiceNotAvailable(u8),
    SizeMismatch(u8),
    Rejected(u8),
}

impl fmt::Display for Refusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Refusal::MissingProperty(code) => write!(f, "no property {:02X}", code),
            Refusal::ServiceNotAvailable(code) => write!(f, "property {:02X} does not accept this service", code),
            Refusal::SizeMismatch(code) => write!(f, "wrong data size for property {:02X}", code),
            Refusal::Rejected(code) => write!(f, "listener rejected property {:02X}", code),
        }
    }
}

/// Validates a request addressed to one of the node's objects, applies it
/// and builds the answer
///
/// Returns `None` when nothing is sent back: unknown destination object,
/// codes that are not requests, or write requests that need no response.
/// A refused request yields the error response of its service code.
pub(crate) fn handle_request(
    node: &mut BaseNode,
    message: &Message,
    listener: Option<&dyn NodeListener>,
) -> Option<Message> {
    let Some(object) = node.object_mut(message.deoj) else {
        trace!("no object {} for {}, dropped", message.deoj, message.esv);
        return None;
    };

    if message.esv == Esv::NOTIFICATION_RESPONSE_REQUIRED {
        return Some(notification_ack(message, object.code()));
    }
    if !message.esv.is_request() {
        trace!("{} to {} is not a request, dropped", message.esv, message.deoj);
        return None;
    }

    let result = validate(object, message).and_then(|()| dispatch(object, message, listener));
    if let Err(refusal) = result {
        debug!("refusing {} to {}: {}", message.esv, object.code(), refusal);
        return impossible_response(object, message);
    }

    if !message.esv.requires_response() {
        return None;
    }
    let mut response = Message::response_to(message)?;
    response.seoj = object.code();
    if message.esv == Esv::NOTIFICATION_REQUEST {
        response.deoj = ObjectCode::NODE_PROFILE;
    }
    for prop in &message.properties {
        let data = object.property_data(prop.code).cloned().unwrap_or_default();
        response.add_property(MessageProperty::new(prop.code, data));
    }
    Some(response)
}

fn validate(object: &Object, message: &Message) -> Result<(), Refusal> {
    let esv = message.esv;
    for prop in &message.properties {
        let Some(stored) = object.property(prop.code) else {
            return Err(Refusal::MissingProperty(prop.code));
        };
        if !stored.is_available_service(esv) {
            return Err(Refusal::ServiceNotAvailable(prop.code));
        }
        if esv.is_write_class() && stored.size() > 0 && stored.size() != prop.pdc() {
            return Err(Refusal::SizeMismatch(prop.code));
        }
    }
    Ok(())
}

fn dispatch(
    object: &mut Object,
    message: &Message,
    listener: Option<&dyn NodeListener>,
) -> Result<(), Refusal> {
    let object_listener = object.listener();
    for prop in &message.properties {
        match &object_listener {
            Some(l) => {
                if !l.property_request_received(object, message.esv, prop) {
                    return Err(Refusal::Rejected(prop.code));
                }
            }
            None if message.esv.is_write_class() => {
                if object.set_property_data(prop.code, prop.data.clone()).is_err() {
                    return Err(Refusal::MissingProperty(prop.code));
                }
            }
            None => {}
        }
        if let Some(l) = listener {
            l.property_request_received(object.code(), message.esv, prop);
        }
    }
    Ok(())
}

/// Error response: write requests echo what was sent, read requests carry
/// the current value of every property that can be read and an empty
/// entry for the rest
fn impossible_response(object: &Object, message: &Message) -> Option<Message> {
    let mut response = Message::impossible_response_to(message)?;
    response.seoj = object.code();
    for prop in &message.properties {
        let entry = if message.esv.is_write_class() {
            prop.clone()
        } else {
            let data = object
                .property(prop.code)
                .filter(|p| p.is_readable() || p.is_announceable())
                .map(|p| p.data().clone())
                .unwrap_or_else(Bytes::new);
            MessageProperty::new(prop.code, data)
        };
        response.add_property(entry);
    }
    Some(response)
}

fn notification_ack(message: &Message, source: ObjectCode) -> Message {
    let mut ack = Message::new(source, message.seoj, Esv::NOTIFICATION_RESPONSE).with_tid(message.tid);
    for prop in &message.properties {
        ack.add_property(MessageProperty::empty(prop.code));
    }
    ack
}
