//! Standard database
//!
//! Read-only lookup of class templates (mandatory properties per class) and
//! manufacturer names. The caller builds it once at start-up and shares it
//! through an `Arc`; nothing in the library looks it up implicitly.

use std::collections::HashMap;

use crate::core::{ClassCode, ObjectCode};
use crate::object::{Attribute, Object};

/// A property every instance of a class carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTemplate {
    /// Property code
    pub code: u8,
    /// Access attribute
    pub attribute: Attribute,
    /// Human readable name
    pub name: String,
}

/// Mandatory properties of a class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTemplate {
    /// Class code
    pub class: ClassCode,
    /// Human readable name
    pub name: String,
    /// Properties on top of the super-class ones
    pub properties: Vec<PropertyTemplate>,
}

impl ObjectTemplate {
    /// Creates a template with no class specific property
    pub fn new(class: ClassCode, name: impl Into<String>) -> Self {
        ObjectTemplate {
            class,
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Adds a property, builder style
    pub fn with_property(mut self, code: u8, attribute: Attribute, name: impl Into<String>) -> Self {
        self.properties.push(PropertyTemplate {
            code,
            attribute,
            name: name.into(),
        });
        self
    }
}

/// In-memory standard database
#[derive(Debug, Clone, Default)]
pub struct StandardDatabase {
    objects: HashMap<ClassCode, ObjectTemplate>,
    manufacturers: HashMap<u32, String>,
}

impl StandardDatabase {
    /// Creates an empty database
    pub fn new() -> Self {
        StandardDatabase::default()
    }

    /// Registers a class template
    pub fn add_object(&mut self, template: ObjectTemplate) -> &mut Self {
        self.objects.insert(template.class, template);
        self
    }

    /// Registers a manufacturer name
    pub fn add_manufacturer(&mut self, code: u32, name: impl Into<String>) -> &mut Self {
        self.manufacturers.insert(code, name.into());
        self
    }

    /// Returns the template of a class
    pub fn object(&self, class: ClassCode) -> Option<&ObjectTemplate> {
        self.objects.get(&class)
    }

    /// Returns the manufacturer name for a code
    pub fn manufacturer_name(&self, code: u32) -> Option<&str> {
        self.manufacturers.get(&code).map(String::as_str)
    }

    /// Creates an object pre-populated from its class template
    ///
    /// Profiles start from the profile super class, everything else from the
    /// device super class. Unknown classes get the super-class properties
    /// only.
    pub fn create_object(&self, code: ObjectCode) -> Object {
        let mut object = if code.is_profile() {
            Object::profile(code.class_code(), code.instance())
        } else {
            Object::device(code)
        };
        if let Some(template) = self.object(code.class()) {
            for prop in &template.properties {
                // Template codes come from the database; skip the odd bad one
                let _ = object.add_property(prop.code, prop.attribute);
            }
        }
        object
    }
}
