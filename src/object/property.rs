use std::fmt;
use std::ops::BitOr;

use bytes::Bytes;

use crate::core::ObjectCode;
use crate::protocol::Esv;

/// Lowest property code an object may carry
pub const PROPERTY_CODE_MIN: u8 = 0x80;

/// Access capabilities of a property
///
/// Read, write and announce are independent bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Attribute(u8);

impl Attribute {
    /// No access
    pub const NONE: Attribute = Attribute(0x00);
    /// Readable with Get
    pub const READ: Attribute = Attribute(0x01);
    /// Writable with SetI/SetC
    pub const WRITE: Attribute = Attribute(0x02);
    /// Announced on change
    pub const ANNOUNCE: Attribute = Attribute(0x10);
    /// Read and write
    pub const READ_WRITE: Attribute = Attribute(0x03);
    /// Read and announce
    pub const READ_ANNOUNCE: Attribute = Attribute(0x11);
    /// Read, write and announce
    pub const READ_WRITE_ANNOUNCE: Attribute = Attribute(0x13);

    /// Returns the raw bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set
    pub const fn contains(self, other: Attribute) -> bool {
        self.0 & other.0 == other.0
    }

    /// Readable
    pub const fn is_readable(self) -> bool {
        self.contains(Attribute::READ)
    }

    /// Writable
    pub const fn is_writable(self) -> bool {
        self.contains(Attribute::WRITE)
    }

    /// Announceable
    pub const fn is_announceable(self) -> bool {
        self.contains(Attribute::ANNOUNCE)
    }
}

impl BitOr for Attribute {
    type Output = Attribute;

    fn bitor(self, rhs: Attribute) -> Attribute {
        Attribute(self.0 | rhs.0)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(self.is_readable(), 'R'),
            flag(self.is_writable(), 'W'),
            flag(self.is_announceable(), 'A')
        )
    }
}

/// A property of an object: code, access attribute and current data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    code: u8,
    attribute: Attribute,
    data: Bytes,
    /// Code of the owning object; a lookup key, not an owner
    parent: Option<ObjectCode>,
}

impl Property {
    /// Creates a property with no data
    pub fn new(code: u8, attribute: Attribute) -> Self {
        Property {
            code,
            attribute,
            data: Bytes::new(),
            parent: None,
        }
    }

    /// Creates a property with initial data
    pub fn with_data(code: u8, attribute: Attribute, data: impl Into<Bytes>) -> Self {
        Property {
            code,
            attribute,
            data: data.into(),
            parent: None,
        }
    }

    /// Returns the property code
    pub fn code(&self) -> u8 {
        self.code
    }

    /// Returns the access attribute
    pub fn attribute(&self) -> Attribute {
        self.attribute
    }

    pub(crate) fn set_attribute(&mut self, attribute: Attribute) {
        self.attribute = attribute;
    }

    /// Returns the current data
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns the data length
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Replaces the data without any side effect
    ///
    /// Use `Object::set_property_data` to get change announcements.
    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
    }

    /// Returns the code of the owning object
    pub fn parent(&self) -> Option<ObjectCode> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: ObjectCode) {
        self.parent = Some(parent);
    }

    /// Returns the data as a big-endian unsigned integer
    pub fn integer(&self) -> u32 {
        self.data.iter().take(4).fold(0u32, |acc, b| (acc << 8) | *b as u32)
    }

    /// Returns true if readable
    pub fn is_readable(&self) -> bool {
        self.attribute.is_readable()
    }

    /// Returns true if writable
    pub fn is_writable(&self) -> bool {
        self.attribute.is_writable()
    }

    /// Returns true if announceable
    pub fn is_announceable(&self) -> bool {
        self.attribute.is_announceable()
    }

    /// Returns true if the attribute bits allow `esv` on this property
    pub fn is_available_service(&self, esv: Esv) -> bool {
        match esv {
            Esv::WRITE_REQUEST | Esv::WRITE_REQUEST_RESPONSE_REQUIRED => self.is_writable(),
            Esv::READ_REQUEST => self.is_readable(),
            Esv::WRITE_READ_REQUEST => self.is_readable() && self.is_writable(),
            Esv::NOTIFICATION_REQUEST
            | Esv::NOTIFICATION
            | Esv::NOTIFICATION_RESPONSE_REQUIRED => self.is_announceable(),
            _ => false,
        }
    }
}

/// Encodes `value` as a big-endian integer of `size` bytes (at most 4)
pub(crate) fn integer_bytes(value: u32, size: usize) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    bytes[4 - size.min(4)..].to_vec()
}
