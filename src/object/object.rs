use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::core::{Error, ObjectCode, Result, TidCounter, MANUFACTURER_EXPERIMENTAL};
use crate::protocol::{Esv, Message, MessageProperty};
use super::property::{integer_bytes, Attribute, Property, PROPERTY_CODE_MIN};
use super::property_map::PropertyMap;

/// Operation status (0x30 on, 0x31 off)
pub const EPC_OPERATING_STATUS: u8 = 0x80;
/// Manufacturer code (3 bytes)
pub const EPC_MANUFACTURER_CODE: u8 = 0x8A;
/// Status change announcement property map
pub const EPC_ANNO_PROPERTY_MAP: u8 = 0x9D;
/// Set property map
pub const EPC_SET_PROPERTY_MAP: u8 = 0x9E;
/// Get property map
pub const EPC_GET_PROPERTY_MAP: u8 = 0x9F;

/// Operation status "on"
pub const OPERATING_STATUS_ON: u8 = 0x30;
/// Operation status "off"
pub const OPERATING_STATUS_OFF: u8 = 0x31;

/// Receives the validated requests addressed to one object
///
/// Called once per property of the request, with the node's object
/// collection locked: implementations must not call back into the node.
pub trait ObjectListener: Send + Sync {
    /// Handles one requested property.
    ///
    /// For write requests the listener applies the new data, typically with
    /// `object.set_property_data`. Returning `false` refuses the request,
    /// which is then answered with the error service code.
    fn property_request_received(
        &self,
        object: &mut Object,
        esv: Esv,
        property: &MessageProperty,
    ) -> bool;
}

/// Link from an object to its running local node, used to announce
/// property changes
#[derive(Clone)]
pub(crate) struct Announcer {
    running: Arc<AtomicBool>,
    tid: Arc<TidCounter>,
    tx: mpsc::UnboundedSender<Message>,
}

impl Announcer {
    pub(crate) fn new(
        running: Arc<AtomicBool>,
        tid: Arc<TidCounter>,
        tx: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Announcer { running, tid, tx }
    }

    fn announce(&self, source: ObjectCode, code: u8, data: Bytes) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let mut msg = Message::new(source, ObjectCode::NODE_PROFILE, Esv::NOTIFICATION)
            .with_tid(self.tid.next());
        msg.add_property(MessageProperty::new(code, data));
        if self.tx.send(msg).is_err() {
            debug!("announce queue closed, dropping change of {:02X} on {}", code, source);
        }
    }
}

/// An ECHONET object: a code and its property collection
///
/// The three property maps (0x9D, 0x9E, 0x9F) are recomputed whenever a
/// property is added or its attribute changes, so they always describe the
/// current property set.
#[derive(Clone)]
pub struct Object {
    code: ObjectCode,
    properties: BTreeMap<u8, Property>,
    get_map: PropertyMap,
    set_map: PropertyMap,
    anno_map: PropertyMap,
    listener: Option<Arc<dyn ObjectListener>>,
    announcer: Option<Announcer>,
}

impl Object {
    /// Creates an object with the super-object properties: operation
    /// status, manufacturer code and the three property maps
    pub fn new(code: ObjectCode) -> Self {
        let mut object = Object::bare(code);
        object.insert(Property::with_data(
            EPC_OPERATING_STATUS,
            Attribute::READ_ANNOUNCE,
            vec![OPERATING_STATUS_ON],
        ));
        object.insert(Property::with_data(
            EPC_MANUFACTURER_CODE,
            Attribute::READ,
            integer_bytes(MANUFACTURER_EXPERIMENTAL, 3),
        ));
        object.insert(Property::new(EPC_ANNO_PROPERTY_MAP, Attribute::READ));
        object.insert(Property::new(EPC_SET_PROPERTY_MAP, Attribute::READ));
        object.insert(Property::new(EPC_GET_PROPERTY_MAP, Attribute::READ));
        object.update_property_maps();
        object
    }

    /// Creates an object without any property
    pub fn bare(code: ObjectCode) -> Self {
        Object {
            code,
            properties: BTreeMap::new(),
            get_map: PropertyMap::new(),
            set_map: PropertyMap::new(),
            anno_map: PropertyMap::new(),
            listener: None,
            announcer: None,
        }
    }

    /// Returns the object code
    pub fn code(&self) -> ObjectCode {
        self.code
    }

    /// Returns the class group code
    pub fn class_group(&self) -> u8 {
        self.code.class_group()
    }

    /// Returns the class code
    pub fn class_code(&self) -> u8 {
        self.code.class_code()
    }

    /// Returns the instance code
    pub fn instance(&self) -> u8 {
        self.code.instance()
    }

    /// Returns true for profile objects
    pub fn is_profile(&self) -> bool {
        self.code.is_profile()
    }

    /// Returns true for node profile objects
    pub fn is_node_profile(&self) -> bool {
        self.code.is_node_profile()
    }

    /// Returns true for device objects
    pub fn is_device(&self) -> bool {
        !self.is_profile()
    }

    /// Inserts a property without validation; the caller refreshes the maps
    pub(crate) fn insert(&mut self, mut property: Property) {
        property.set_parent(self.code);
        self.properties.insert(property.code(), property);
    }

    /// Adds or replaces a property and recomputes the property maps
    pub fn add_property(&mut self, code: u8, attribute: Attribute) -> Result<&Property> {
        self.add(Property::new(code, attribute))
    }

    /// Adds or replaces a property carrying initial data
    pub fn add_property_with_data(
        &mut self,
        code: u8,
        attribute: Attribute,
        data: impl Into<Bytes>,
    ) -> Result<&Property> {
        self.add(Property::with_data(code, attribute, data))
    }

    fn add(&mut self, property: Property) -> Result<&Property> {
        let code = property.code();
        if code < PROPERTY_CODE_MIN {
            return Err(Error::protocol(format!(
                "property code {:02X} is below {:02X}",
                code, PROPERTY_CODE_MIN
            )));
        }
        self.insert(property);
        self.update_property_maps();
        Ok(&self.properties[&code])
    }

    /// Changes the attribute of an existing property and recomputes the maps
    pub fn set_property_attribute(&mut self, code: u8, attribute: Attribute) -> Result<()> {
        let object_code = self.code;
        let prop = self
            .properties
            .get_mut(&code)
            .ok_or_else(|| Error::protocol(format!("{} has no property {:02X}", object_code, code)))?;
        prop.set_attribute(attribute);
        self.update_property_maps();
        Ok(())
    }

    /// Returns the property with the given code
    pub fn property(&self, code: u8) -> Option<&Property> {
        self.properties.get(&code)
    }

    /// Returns true if the property exists
    pub fn has_property(&self, code: u8) -> bool {
        self.properties.contains_key(&code)
    }

    /// Properties in code order
    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    /// Number of properties
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Returns the data of a property
    pub fn property_data(&self, code: u8) -> Option<&Bytes> {
        self.properties.get(&code).map(Property::data)
    }

    /// Sets the data of a property.
    ///
    /// If the property is announceable and the owning local node is running,
    /// this also multicasts a notification (ESV 0x73) carrying the new
    /// value. Other properties never cause network traffic.
    pub fn set_property_data(&mut self, code: u8, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        let object_code = self.code;
        let prop = self
            .properties
            .get_mut(&code)
            .ok_or_else(|| Error::protocol(format!("{} has no property {:02X}", object_code, code)))?;
        prop.set_data(data.clone());
        trace!("{} property {:02X} set to {}", self.code, code, hex::encode_upper(&data));

        if prop.is_announceable() {
            if let Some(announcer) = &self.announcer {
                announcer.announce(self.code, code, data);
            }
        }
        Ok(())
    }

    /// Sets a property to a big-endian integer of `size` bytes
    pub fn set_property_integer(&mut self, code: u8, value: u32, size: usize) -> Result<()> {
        self.set_property_data(code, integer_bytes(value, size))
    }

    /// Sets data without announcing, for values maintained by the node itself
    pub(crate) fn store_property_data(&mut self, code: u8, data: impl Into<Bytes>) {
        if let Some(prop) = self.properties.get_mut(&code) {
            prop.set_data(data);
        }
    }

    /// Readable properties
    pub fn get_map(&self) -> &PropertyMap {
        &self.get_map
    }

    /// Writable properties
    pub fn set_map(&self) -> &PropertyMap {
        &self.set_map
    }

    /// Announced properties
    pub fn anno_map(&self) -> &PropertyMap {
        &self.anno_map
    }

    pub(crate) fn update_property_maps(&mut self) {
        let mut get_map = PropertyMap::new();
        let mut set_map = PropertyMap::new();
        let mut anno_map = PropertyMap::new();
        for prop in self.properties.values() {
            if prop.is_readable() {
                get_map.insert(prop.code());
            }
            if prop.is_writable() {
                set_map.insert(prop.code());
            }
            if prop.is_announceable() {
                anno_map.insert(prop.code());
            }
        }

        for (code, map) in [
            (EPC_GET_PROPERTY_MAP, &get_map),
            (EPC_SET_PROPERTY_MAP, &set_map),
            (EPC_ANNO_PROPERTY_MAP, &anno_map),
        ] {
            self.store_property_data(code, map.encode());
        }

        self.get_map = get_map;
        self.set_map = set_map;
        self.anno_map = anno_map;
    }

    /// Returns the manufacturer code (0x8A)
    pub fn manufacturer_code(&self) -> Option<u32> {
        self.property(EPC_MANUFACTURER_CODE).map(Property::integer)
    }

    /// Sets the manufacturer code (0x8A)
    pub fn set_manufacturer_code(&mut self, code: u32) {
        self.store_property_data(EPC_MANUFACTURER_CODE, integer_bytes(code, 3));
    }

    /// Returns the operation status (0x80)
    pub fn operating_status(&self) -> Option<u8> {
        self.property_data(EPC_OPERATING_STATUS).and_then(|d| d.first().copied())
    }

    /// Registers the request listener, replacing any previous one
    pub fn set_listener(&mut self, listener: Arc<dyn ObjectListener>) {
        self.listener = Some(listener);
    }

    /// Returns the request listener
    pub fn listener(&self) -> Option<Arc<dyn ObjectListener>> {
        self.listener.clone()
    }

    pub(crate) fn attach_announcer(&mut self, announcer: Announcer) {
        self.announcer = Some(announcer);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("code", &self.code)
            .field("properties", &self.properties.values().collect::<Vec<_>>())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
