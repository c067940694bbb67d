use bytes::{BufMut, Bytes, BytesMut};
use std::io::Read;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, ObjectCode, Result};
use super::esv::Esv;
use super::message::{Message, MessageProperty};

/// ECHONET Lite header byte 1
pub const EHD1: u8 = 0x10;
/// ECHONET Lite header byte 2 for the fixed "format 1" frame
pub const EHD2_FORMAT1: u8 = 0x81;
/// EHD1, EHD2, TID, SEOJ, DEOJ, ESV, OPC
pub const HEADER_SIZE: usize = 12;

fn take<'a>(src: &mut &'a [u8], n: usize, stage: &'static str) -> Result<&'a [u8]> {
    if src.len() < n {
        return Err(Error::short(stage, n, src.len()));
    }
    let (head, tail) = src.split_at(n);
    *src = tail;
    Ok(head)
}

fn check_header(ehd1: u8, ehd2: u8) -> Result<()> {
    if ehd1 != EHD1 {
        return Err(Error::malformed(format!("EHD1 is {:02X}, expected {:02X}", ehd1, EHD1)));
    }
    if ehd2 != EHD2_FORMAT1 {
        return Err(Error::malformed(format!(
            "EHD2 is {:02X}, expected {:02X}",
            ehd2, EHD2_FORMAT1
        )));
    }
    Ok(())
}

fn object_code(bytes: &[u8]) -> ObjectCode {
    ObjectCode::from_bytes([bytes[0], bytes[1], bytes[2]])
}

/// Decodes one frame from `bytes`
///
/// Trailing bytes after the last property are ignored.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let mut src = bytes;

    let ehd = take(&mut src, 2, "header")?;
    check_header(ehd[0], ehd[1])?;

    let tid = take(&mut src, 2, "TID")?;
    let tid = u16::from_be_bytes([tid[0], tid[1]]);
    let seoj = object_code(take(&mut src, 3, "SEOJ")?);
    let deoj = object_code(take(&mut src, 3, "DEOJ")?);
    let esv = Esv(take(&mut src, 1, "ESV")?[0]);
    let opc = take(&mut src, 1, "OPC")?[0] as usize;

    let mut properties = Vec::with_capacity(opc);
    for _ in 0..opc {
        let code = take(&mut src, 1, "property code")?[0];
        let pdc = take(&mut src, 1, "property data counter")?[0] as usize;
        let data = take(&mut src, pdc, "property data")?;
        properties.push(MessageProperty::new(code, Bytes::copy_from_slice(data)));
    }

    Ok(Message {
        tid,
        seoj,
        deoj,
        esv,
        properties,
    })
}

/// Decodes exactly one frame from a synchronous reader
///
/// Reads the header, then each property in turn, without consuming
/// anything past the frame.
pub fn read_from<R: Read>(mut reader: R) -> Result<Message> {
    fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], stage: &'static str) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => return Err(Error::short(stage, buf.len(), filled)),
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    let mut frame = vec![0u8; HEADER_SIZE];
    read_exact(&mut reader, &mut frame, "header")?;
    check_header(frame[0], frame[1])?;

    let opc = frame[HEADER_SIZE - 1] as usize;
    for _ in 0..opc {
        let mut epc_pdc = [0u8; 2];
        read_exact(&mut reader, &mut epc_pdc, "property code")?;
        frame.extend_from_slice(&epc_pdc);
        let start = frame.len();
        frame.resize(start + epc_pdc[1] as usize, 0);
        read_exact(&mut reader, &mut frame[start..], "property data")?;
    }

    decode(&frame)
}

/// Writes the frame into `dst`
pub fn encode_into(message: &Message, dst: &mut impl BufMut) -> Result<()> {
    if message.properties.len() > u8::MAX as usize {
        return Err(Error::protocol(format!(
            "{} properties do not fit in OPC",
            message.properties.len()
        )));
    }
    if let Some(prop) = message.properties.iter().find(|p| p.data.len() > u8::MAX as usize) {
        return Err(Error::protocol(format!(
            "property {:02X} carries {} bytes, PDC is limited to 255",
            prop.code,
            prop.data.len()
        )));
    }

    dst.put_u8(EHD1);
    dst.put_u8(EHD2_FORMAT1);
    dst.put_u16(message.tid);
    dst.put_slice(&message.seoj.to_bytes());
    dst.put_slice(&message.deoj.to_bytes());
    dst.put_u8(message.esv.code());
    dst.put_u8(message.properties.len() as u8);
    for prop in &message.properties {
        dst.put_u8(prop.code);
        dst.put_u8(prop.data.len() as u8);
        dst.put_slice(&prop.data);
    }
    Ok(())
}

/// Encodes the frame into a new buffer
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(message.encoded_len());
    encode_into(message, &mut buf)?;
    Ok(buf)
}

/// Returns the length of the first complete frame in `src`, or `None` if
/// more bytes are needed.
fn frame_len(src: &[u8]) -> Result<Option<usize>> {
    if src.len() < 2 {
        return Ok(None);
    }
    check_header(src[0], src[1])?;
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let opc = src[HEADER_SIZE - 1] as usize;
    let mut len = HEADER_SIZE;
    for _ in 0..opc {
        if src.len() < len + 2 {
            return Ok(None);
        }
        len += 2 + src[len + 1] as usize;
    }
    if src.len() < len {
        return Ok(None);
    }
    Ok(Some(len))
}

/// Stream codec for ECHONET Lite frames over TCP
///
/// Frames carry no length prefix; the decoder walks the property headers
/// to find the frame boundary.
#[derive(Debug, Clone, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Creates a new message codec
    pub fn new() -> Self {
        MessageCodec
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let len = match frame_len(src)? {
            Some(len) => len,
            None => return Ok(None),
        };

        let frame = src.split_to(len);
        decode(&frame).map(Some)
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.encoded_len());
        encode_into(&item, dst)
    }
}

impl Encoder<&Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.encoded_len());
        encode_into(item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SCENARIO: [u8; 24] = [
        0x10, 0x81, 0x00, 0x00, 0xA0, 0xB0, 0xC0, 0xD0, 0xE0, 0xF0, 0x62, 0x03, 0x01, 0x01, 0x61,
        0x02, 0x02, 0x62, 0x63, 0x03, 0x03, 0x63, 0x64, 0x65,
    ];

    #[test]
    fn test_decode_scenario() {
        let msg = decode(&SCENARIO).unwrap();
        assert_eq!(msg.tid, 0);
        assert_eq!(msg.seoj, ObjectCode::from_u32(0xA0B0C0));
        assert_eq!(msg.deoj, ObjectCode::from_u32(0xD0E0F0));
        assert_eq!(msg.esv, Esv::READ_REQUEST);
        assert_eq!(msg.opc(), 3);
        assert_eq!(msg.properties[0], MessageProperty::new(0x01, &b"a"[..]));
        assert_eq!(msg.properties[1], MessageProperty::new(0x02, &b"bc"[..]));
        assert_eq!(msg.properties[2], MessageProperty::new(0x03, &b"cde"[..]));

        assert_eq!(encode(&msg).unwrap(), SCENARIO.to_vec());
    }

    #[test]
    fn test_round_trip() {
        let msg = Message::new(ObjectCode::CONTROLLER, ObjectCode::new(0x02, 0x90, 0x01), Esv::WRITE_READ_REQUEST)
            .with_tid(0xFFFF)
            .with_property(0x80, vec![0x30])
            .with_property(0xB0, Vec::new())
            .with_property(0xFF, vec![0xAB; 255]);
        let bytes = encode(&msg).unwrap();
        assert_eq!(bytes.len(), 12 + 3 + 2 + 257);
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_bad_header() {
        let mut bytes = SCENARIO;
        bytes[0] = 0x11;
        assert!(matches!(decode(&bytes), Err(Error::MalformedFrame(_))));

        let mut bytes = SCENARIO;
        bytes[1] = 0x82;
        assert!(matches!(decode(&bytes), Err(Error::MalformedFrame(_))));
    }

    #[test]
    fn test_truncation_names_stage() {
        let cases: [(usize, &str); 5] = [
            (1, "header"),
            (5, "SEOJ"),
            (11, "OPC"),
            (13, "property data counter"),
            (21, "property data"),
        ];
        for (len, expected) in cases {
            match decode(&SCENARIO[..len]) {
                Err(Error::ShortMessage { stage, .. }) => assert_eq!(stage, expected, "len {}", len),
                other => panic!("len {}: unexpected {:?}", len, other),
            }
        }
    }

    #[test]
    fn test_encode_limits() {
        let mut msg = Message::new(ObjectCode::CONTROLLER, ObjectCode::NODE_PROFILE, Esv::READ_REQUEST);
        msg.add_property(MessageProperty::new(0x80, vec![0u8; 256]));
        assert!(matches!(encode(&msg), Err(Error::Protocol(_))));

        let mut msg = Message::new(ObjectCode::CONTROLLER, ObjectCode::NODE_PROFILE, Esv::READ_REQUEST);
        for _ in 0..256 {
            msg.add_property(MessageProperty::empty(0x80));
        }
        assert!(matches!(encode(&msg), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_read_from_reader() {
        let mut stream = SCENARIO.to_vec();
        stream.extend_from_slice(&SCENARIO);
        let mut cursor = Cursor::new(stream);

        let first = read_from(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 24);
        let second = read_from(&mut cursor).unwrap();
        assert_eq!(first, second);

        let err = read_from(Cursor::new(SCENARIO[..18].to_vec())).unwrap_err();
        assert!(matches!(err, Error::ShortMessage { stage: "property data", .. }));
    }

    #[test]
    fn test_codec_partial_frames() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&SCENARIO[..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&SCENARIO[10..20]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&SCENARIO[20..]);
        buf.extend_from_slice(&SCENARIO[..4]);

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.opc(), 3);
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_codec_encode() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        let msg = decode(&SCENARIO).unwrap();

        codec.encode(&msg, &mut buf).unwrap();
        assert_eq!(&buf[..], &SCENARIO[..]);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, msg);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_rejects_bad_header() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&[0x10u8, 0x82, 0x00][..]);
        assert!(matches!(codec.decode(&mut buf), Err(Error::MalformedFrame(_))));
    }
}
