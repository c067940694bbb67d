use crate::core::ObjectCode;
use super::object::Object;
use super::property::{Attribute, Property};

/// Installation location
pub const EPC_INSTALLATION_LOCATION: u8 = 0x81;
/// Standard version information
pub const EPC_STANDARD_VERSION: u8 = 0x82;
/// Identification number
pub const EPC_IDENTIFICATION_NUMBER: u8 = 0x83;
/// Fault status
pub const EPC_FAULT_STATUS: u8 = 0x88;

/// Installation location not specified
pub const INSTALLATION_LOCATION_UNSPECIFIED: u8 = 0x00;
/// Fault status "fault occurred"
pub const FAULT_OCCURRED: u8 = 0x41;
/// Fault status "no fault"
pub const FAULT_NONE: u8 = 0x42;

/// Appendix release the device object claims (release R, revision 1)
pub const STANDARD_VERSION: [u8; 4] = [0x00, 0x00, b'R', 0x01];

impl Object {
    /// Creates a device object with the device super-class properties
    pub fn device(code: ObjectCode) -> Object {
        let mut object = Object::new(code);
        object.insert(Property::with_data(
            EPC_INSTALLATION_LOCATION,
            Attribute::READ_WRITE_ANNOUNCE,
            vec![INSTALLATION_LOCATION_UNSPECIFIED],
        ));
        object.insert(Property::with_data(
            EPC_STANDARD_VERSION,
            Attribute::READ,
            STANDARD_VERSION.to_vec(),
        ));
        object.insert(Property::with_data(
            EPC_FAULT_STATUS,
            Attribute::READ_ANNOUNCE,
            vec![FAULT_NONE],
        ));
        object.update_property_maps();
        object
    }
}
