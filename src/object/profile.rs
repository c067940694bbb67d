use crate::core::{ClassCode, ObjectCode, PROFILE_CLASS_GROUP};
use super::device::{EPC_FAULT_STATUS, EPC_IDENTIFICATION_NUMBER, FAULT_NONE};
use super::object::Object;
use super::property::{integer_bytes, Attribute, Property};

/// Version information of the node profile
pub const EPC_VERSION_INFORMATION: u8 = 0x82;
/// Number of self-node instances (3 bytes)
pub const EPC_INSTANCE_COUNT: u8 = 0xD3;
/// Number of self-node classes (2 bytes, node profile class included)
pub const EPC_CLASS_COUNT: u8 = 0xD4;
/// Instance list notification
pub const EPC_INSTANCE_LIST_NOTIFICATION: u8 = 0xD5;
/// Self-node instance list S
pub const EPC_SELF_NODE_INSTANCE_LIST: u8 = 0xD6;
/// Self-node class list S
pub const EPC_SELF_NODE_CLASS_LIST: u8 = 0xD7;

/// ECHONET Lite 1.10, message format 1 only
pub const NODE_PROFILE_VERSION: [u8; 4] = [0x01, 0x0A, 0x01, 0x00];
/// Most instances an instance list property can carry
pub const MAX_INSTANCE_LIST: usize = 84;
/// Most classes the self-node class list carries
pub const MAX_CLASS_LIST: usize = 8;

const IDENTIFICATION_PREFIX: u8 = 0xFE;

impl Object {
    /// Creates a profile object (class group 0x0E)
    pub fn profile(class_code: u8, instance: u8) -> Object {
        let mut object = Object::new(ObjectCode::new(PROFILE_CLASS_GROUP, class_code, instance));
        object.insert(Property::with_data(EPC_FAULT_STATUS, Attribute::READ, vec![FAULT_NONE]));
        object.update_property_maps();
        object
    }

    /// Creates the node profile: 0x0EF001, or 0x0EF002 for a
    /// transmission-only node
    pub fn node_profile(manufacturer_code: u32, read_only: bool) -> Object {
        let code = if read_only {
            ObjectCode::NODE_PROFILE_READ_ONLY
        } else {
            ObjectCode::NODE_PROFILE
        };
        let mut object = Object::profile(code.class_code(), code.instance());
        object.set_manufacturer_code(manufacturer_code);
        object.insert(Property::with_data(
            EPC_VERSION_INFORMATION,
            Attribute::READ,
            NODE_PROFILE_VERSION.to_vec(),
        ));
        object.insert(Property::with_data(
            EPC_IDENTIFICATION_NUMBER,
            Attribute::READ,
            identification_number(manufacturer_code),
        ));
        object.insert(Property::new(EPC_INSTANCE_COUNT, Attribute::READ));
        object.insert(Property::new(EPC_CLASS_COUNT, Attribute::READ));
        object.insert(Property::new(EPC_INSTANCE_LIST_NOTIFICATION, Attribute::ANNOUNCE));
        object.insert(Property::new(EPC_SELF_NODE_INSTANCE_LIST, Attribute::READ));
        object.insert(Property::new(EPC_SELF_NODE_CLASS_LIST, Attribute::READ));
        object.update_property_maps();
        update_node_profile(&mut object, std::iter::empty());
        object
    }
}

/// Builds a unique identification number: 0xFE, the manufacturer code and
/// 13 random bytes
pub fn identification_number(manufacturer_code: u32) -> Vec<u8> {
    let mut id = Vec::with_capacity(17);
    id.push(IDENTIFICATION_PREFIX);
    id.extend(integer_bytes(manufacturer_code, 3));
    id.extend((0..13).map(|_| rand::random::<u8>()));
    id
}

/// Encodes an instance list: count, then 3-byte codes (at most 84)
pub fn encode_instance_list(codes: &[ObjectCode]) -> Vec<u8> {
    let codes = &codes[..codes.len().min(MAX_INSTANCE_LIST)];
    let mut data = Vec::with_capacity(1 + 3 * codes.len());
    data.push(codes.len() as u8);
    for code in codes {
        data.extend_from_slice(&code.to_bytes());
    }
    data
}

/// Decodes an instance list
///
/// A list shorter than its count yields the complete entries only.
pub fn decode_instance_list(data: &[u8]) -> Vec<ObjectCode> {
    let Some((&count, rest)) = data.split_first() else {
        return Vec::new();
    };
    rest.chunks_exact(3)
        .take(count as usize)
        .map(|c| ObjectCode::from_bytes([c[0], c[1], c[2]]))
        .collect()
}

/// Encodes a class list: count, then 2-byte class codes (at most 8)
pub fn encode_class_list(classes: &[ClassCode]) -> Vec<u8> {
    let classes = &classes[..classes.len().min(MAX_CLASS_LIST)];
    let mut data = Vec::with_capacity(1 + 2 * classes.len());
    data.push(classes.len() as u8);
    for class in classes {
        data.extend_from_slice(&class.to_bytes());
    }
    data
}

/// Decodes a class list
pub fn decode_class_list(data: &[u8]) -> Vec<ClassCode> {
    let Some((&count, rest)) = data.split_first() else {
        return Vec::new();
    };
    rest.chunks_exact(2)
        .take(count as usize)
        .map(|c| ClassCode::new(c[0], c[1]))
        .collect()
}

/// Recomputes the instance and class properties of a node profile from
/// the node's device objects
pub(crate) fn update_node_profile(profile: &mut Object, devices: impl Iterator<Item = ObjectCode>) {
    let instances: Vec<ObjectCode> = devices.collect();
    let mut classes: Vec<ClassCode> = instances.iter().map(|c| c.class()).collect();
    classes.sort();
    classes.dedup();

    let instance_list = encode_instance_list(&instances);
    profile.store_property_data(EPC_INSTANCE_COUNT, integer_bytes(instances.len() as u32, 3));
    profile.store_property_data(EPC_CLASS_COUNT, integer_bytes(classes.len() as u32 + 1, 2));
    profile.store_property_data(EPC_INSTANCE_LIST_NOTIFICATION, instance_list.clone());
    profile.store_property_data(EPC_SELF_NODE_INSTANCE_LIST, instance_list);
    profile.store_property_data(EPC_SELF_NODE_CLASS_LIST, encode_class_list(&classes));
}
