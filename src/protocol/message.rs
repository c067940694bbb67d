use std::fmt;

use bytes::Bytes;

use crate::core::{ObjectCode, Result};
use super::codec;
use super::esv::Esv;

/// One `EPC, PDC, EDT` entry of a frame
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageProperty {
    /// Property code (EPC)
    pub code: u8,
    /// Property data (EDT); its length is the PDC
    pub data: Bytes,
}

impl MessageProperty {
    /// Creates a property entry carrying `data`
    pub fn new(code: u8, data: impl Into<Bytes>) -> Self {
        MessageProperty {
            code,
            data: data.into(),
        }
    }

    /// Creates a property entry with no data (PDC = 0)
    pub fn empty(code: u8) -> Self {
        MessageProperty {
            code,
            data: Bytes::new(),
        }
    }

    /// Returns the property data counter
    pub fn pdc(&self) -> usize {
        self.data.len()
    }
}

/// An ECHONET Lite frame in the fixed "format 1" layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Transaction id
    pub tid: u16,
    /// Source object
    pub seoj: ObjectCode,
    /// Destination object
    pub deoj: ObjectCode,
    /// Service code
    pub esv: Esv,
    /// Property entries; their count is the OPC
    pub properties: Vec<MessageProperty>,
}

impl Message {
    /// Creates a message with no properties and TID 0
    pub fn new(seoj: ObjectCode, deoj: ObjectCode, esv: Esv) -> Self {
        Message {
            tid: 0,
            seoj,
            deoj,
            esv,
            properties: Vec::new(),
        }
    }

    /// Read request for the given property codes
    pub fn read_request(seoj: ObjectCode, deoj: ObjectCode, codes: &[u8]) -> Self {
        let mut msg = Message::new(seoj, deoj, Esv::READ_REQUEST);
        for &code in codes {
            msg.add_property(MessageProperty::empty(code));
        }
        msg
    }

    /// Builds the success response skeleton for a request
    ///
    /// Swaps SEOJ and DEOJ, copies the TID and selects the paired response
    /// code. Returns `None` for codes without a response. The caller fills in
    /// the echoed properties.
    pub fn response_to(request: &Message) -> Option<Message> {
        let esv = request.esv.response()?;
        Some(Message {
            tid: request.tid,
            seoj: request.deoj,
            deoj: request.seoj,
            esv,
            properties: Vec::new(),
        })
    }

    /// Builds the "service not available" response skeleton for a request
    pub fn impossible_response_to(request: &Message) -> Option<Message> {
        let esv = request.esv.error()?;
        Some(Message {
            tid: request.tid,
            seoj: request.deoj,
            deoj: request.seoj,
            esv,
            properties: Vec::new(),
        })
    }

    /// Sets the transaction id
    pub fn with_tid(mut self, tid: u16) -> Self {
        self.tid = tid;
        self
    }

    /// Appends a property entry
    pub fn add_property(&mut self, property: MessageProperty) {
        self.properties.push(property);
    }

    /// Appends a property entry, builder style
    pub fn with_property(mut self, code: u8, data: impl Into<Bytes>) -> Self {
        self.properties.push(MessageProperty::new(code, data));
        self
    }

    /// Returns the first entry with the given code
    pub fn property(&self, code: u8) -> Option<&MessageProperty> {
        self.properties.iter().find(|p| p.code == code)
    }

    /// Returns the property count
    pub fn opc(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if `self` can be the answer to `request`
    ///
    /// Same TID and a different frame. Comparing the content keeps a node
    /// from taking its own looped-back multicast request as the answer.
    pub fn is_response_to(&self, request: &Message) -> bool {
        self.tid == request.tid && self != request
    }

    /// Encoded length: header plus every `EPC, PDC, EDT`
    pub fn encoded_len(&self) -> usize {
        codec::HEADER_SIZE + self.properties.iter().map(|p| 2 + p.data.len()).sum::<usize>()
    }

    /// Decodes a frame from a byte slice
    pub fn decode(bytes: &[u8]) -> Result<Message> {
        codec::decode(bytes)
    }

    /// Decodes a frame from a synchronous reader
    pub fn read_from<R: std::io::Read>(reader: R) -> Result<Message> {
        codec::read_from(reader)
    }

    /// Encodes the frame
    pub fn encode(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TID={:04X} SEOJ={} DEOJ={} ESV={} OPC={}",
            self.tid,
            self.seoj,
            self.deoj,
            self.esv,
            self.opc()
        )?;
        for prop in &self.properties {
            write!(f, " [{:02X}:{}]", prop.code, hex::encode_upper(&prop.data))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Message {
        Message::read_request(ObjectCode::CONTROLLER, ObjectCode::NODE_PROFILE, &[0xD6])
            .with_tid(0x1234)
    }

    #[test]
    fn test_response_skeleton() {
        let req = request();
        let res = Message::response_to(&req).unwrap();
        assert_eq!(res.tid, 0x1234);
        assert_eq!(res.seoj, ObjectCode::NODE_PROFILE);
        assert_eq!(res.deoj, ObjectCode::CONTROLLER);
        assert_eq!(res.esv, Esv::READ_RESPONSE);
        assert_eq!(res.opc(), 0);

        let err = Message::impossible_response_to(&req).unwrap();
        assert_eq!(err.esv, Esv::READ_REQUEST_ERROR);
        assert_eq!(err.seoj, ObjectCode::NODE_PROFILE);
    }

    #[test]
    fn test_write_request_has_no_response() {
        let req = Message::new(ObjectCode::CONTROLLER, ObjectCode::NODE_PROFILE, Esv::WRITE_REQUEST);
        assert!(Message::response_to(&req).is_none());
        assert!(Message::impossible_response_to(&req).is_some());
    }

    #[test]
    fn test_is_response_to() {
        let req = request();
        assert!(!req.is_response_to(&req));

        let mut res = Message::response_to(&req).unwrap();
        res.add_property(MessageProperty::new(0xD6, vec![0x00]));
        assert!(res.is_response_to(&req));

        let other = res.clone().with_tid(0x1235);
        assert!(!other.is_response_to(&req));
    }

    #[test]
    fn test_encoded_len() {
        let msg = request().with_property(0x80, vec![0x30]);
        assert_eq!(msg.encoded_len(), 12 + 2 + 3);
        assert_eq!(msg.encode().unwrap().len(), msg.encoded_len());
    }

    #[test]
    fn test_display() {
        let msg = request().with_property(0x80, vec![0x30]);
        assert_eq!(
            msg.to_string(),
            "TID=1234 SEOJ=05FF01 DEOJ=0EF001 ESV=62(Get) OPC=2 [D6:] [80:30]"
        );
        let msg = request().with_property(0x8A, vec![0x00, 0x0B, 0xFE]);
        assert!(msg.to_string().ends_with("[8A:000BFE]"));
    }
}
