use std::collections::BTreeSet;

use crate::core::{Error, Result};
use super::property::PROPERTY_CODE_MIN;

/// Largest property count written in format 1 (code list)
pub const FORMAT1_MAX_CODES: usize = 15;
/// Size of a format 2 (bitmap) property map
pub const FORMAT2_SIZE: usize = 17;

/// A set of property codes as announced in the 0x9D/0x9E/0x9F properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
    codes: BTreeSet<u8>,
}

/// Returns the byte index (1..=16) and bit (0..=7) of `code` in a format 2 map
///
/// The low nibble of `code - 0x80` selects the row, the high nibble the bit.
pub fn format2_position(code: u8) -> (usize, u8) {
    let offset = code.wrapping_sub(PROPERTY_CODE_MIN);
    let row = (offset & 0x0F) as usize;
    let bit = (offset & 0xF0) >> 4;
    (row + 1, bit)
}

impl PropertyMap {
    /// Creates an empty map
    pub fn new() -> Self {
        PropertyMap::default()
    }

    /// Adds a code; codes below 0x80 cannot be represented and are refused
    pub fn insert(&mut self, code: u8) -> bool {
        if code < PROPERTY_CODE_MIN {
            return false;
        }
        self.codes.insert(code)
    }

    /// Returns true if the code is in the map
    pub fn contains(&self, code: u8) -> bool {
        self.codes.contains(&code)
    }

    /// Number of codes
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns true if the map holds no code
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Codes in ascending order
    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.codes.iter().copied()
    }

    /// Encodes the map, choosing format 1 for up to 15 codes and format 2
    /// above that
    pub fn encode(&self) -> Vec<u8> {
        if self.codes.len() <= FORMAT1_MAX_CODES {
            let mut data = Vec::with_capacity(1 + self.codes.len());
            data.push(self.codes.len() as u8);
            data.extend(self.codes.iter().copied());
            return data;
        }

        let mut data = vec![0u8; FORMAT2_SIZE];
        data[0] = self.codes.len() as u8;
        for &code in &self.codes {
            let (byte, bit) = format2_position(code);
            data[byte] |= 1 << bit;
        }
        data
    }

    /// Decodes either format
    pub fn decode(data: &[u8]) -> Result<PropertyMap> {
        let count = *data
            .first()
            .ok_or_else(|| Error::protocol("empty property map"))? as usize;

        let mut map = PropertyMap::new();
        if count <= FORMAT1_MAX_CODES {
            let codes = data.get(1..1 + count).ok_or_else(|| {
                Error::protocol(format!(
                    "property map lists {} codes but carries {}",
                    count,
                    data.len() - 1
                ))
            })?;
            for &code in codes {
                map.insert(code);
            }
            return Ok(map);
        }

        if data.len() < FORMAT2_SIZE {
            return Err(Error::protocol(format!(
                "bitmap property map needs {} bytes, got {}",
                FORMAT2_SIZE,
                data.len()
            )));
        }
        for row in 0..16u8 {
            let byte = data[1 + row as usize];
            for bit in 0..8u8 {
                if byte & (1 << bit) != 0 {
                    map.insert(PROPERTY_CODE_MIN + row + 0x10 * bit);
                }
            }
        }
        Ok(map)
    }
}

impl FromIterator<u8> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut map = PropertyMap::new();
        for code in iter {
            map.insert(code);
        }
        map
    }
}
