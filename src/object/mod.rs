//! Object model
//!
//! An object is a code plus a property collection. Device, profile and node
//! profile objects are plain `Object`s pre-populated by their constructors
//! with the mandatory properties of their class.

pub mod device;
pub mod object;
pub mod profile;
pub mod property;
pub mod property_map;

pub use self::object::{
    Object, ObjectListener, EPC_ANNO_PROPERTY_MAP, EPC_GET_PROPERTY_MAP, EPC_MANUFACTURER_CODE,
    EPC_OPERATING_STATUS, EPC_SET_PROPERTY_MAP, OPERATING_STATUS_OFF, OPERATING_STATUS_ON,
};
pub use self::property::{Attribute, Property};
pub use self::property_map::PropertyMap;
