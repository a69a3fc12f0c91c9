//! AMF0 encoding for FLV script tags
//!
//! Only the subset needed to write `onMetaData` is here: numbers, booleans,
//! strings and ECMA arrays.
//!
//! Type markers:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x08 - ECMA Array (32-bit count, then key/value pairs)
//! 0x09 - Object End (after an empty key)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::properties::Properties;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_LONG_STRING: u8 = 0x0C;

/// AMF0 encoder
pub struct Amf0Encoder {
    buf: BytesMut,
}

impl Amf0Encoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
        }
    }

    /// Get the encoded bytes and reset encoder
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn number(&mut self, n: f64) {
        self.buf.put_u8(MARKER_NUMBER);
        self.buf.put_f64(n);
    }

    pub fn boolean(&mut self, b: bool) {
        self.buf.put_u8(MARKER_BOOLEAN);
        self.buf.put_u8(b as u8);
    }

    pub fn string(&mut self, s: &str) {
        if s.len() > 0xFFFF {
            self.buf.put_u8(MARKER_LONG_STRING);
            self.buf.put_u32(s.len() as u32);
        } else {
            self.buf.put_u8(MARKER_STRING);
            self.buf.put_u16(s.len() as u16);
        }
        self.buf.put_slice(s.as_bytes());
    }

    /// Encode a property value, typed by its text: numbers and booleans keep
    /// their AMF type, everything else is a string.
    pub fn typed(&mut self, value: &str) {
        match value {
            "true" => self.boolean(true),
            "false" => self.boolean(false),
            _ => match value.parse::<f64>() {
                Ok(n) if n.is_finite() => self.number(n),
                _ => self.string(value),
            },
        }
    }

    /// Encode `properties` as an ECMA array
    pub fn ecma_array(&mut self, properties: &Properties) {
        self.buf.put_u8(MARKER_ECMA_ARRAY);
        self.buf.put_u32(properties.len() as u32);
        for (key, value) in properties.iter() {
            self.write_utf8(key);
            self.typed(value);
        }
        self.buf.put_u16(0);
        self.buf.put_u8(MARKER_OBJECT_END);
    }

    /// Write UTF-8 string with 16-bit length prefix (no type marker)
    fn write_utf8(&mut self, s: &str) {
        let len = s.len().min(0xFFFF);
        self.buf.put_u16(len as u16);
        self.buf.put_slice(&s.as_bytes()[..len]);
    }
}

impl Default for Amf0Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// `onMetaData` script payload for a property set
pub fn on_metadata(properties: &Properties) -> Bytes {
    let mut encoder = Amf0Encoder::new();
    encoder.string("onMetaData");
    encoder.ecma_array(properties);
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number() {
        let mut encoder = Amf0Encoder::new();
        encoder.number(1.5);
        let bytes = encoder.finish();
        assert_eq!(bytes[0], MARKER_NUMBER);
        assert_eq!(&bytes[1..], &1.5f64.to_be_bytes());
    }

    #[test]
    fn test_typed_values() {
        let mut encoder = Amf0Encoder::new();
        encoder.typed("true");
        encoder.typed("30");
        encoder.typed("fr");
        let bytes = encoder.finish();
        assert_eq!(&bytes[..2], &[MARKER_BOOLEAN, 1]);
        assert_eq!(bytes[2], MARKER_NUMBER);
        assert_eq!(&bytes[11..], &[MARKER_STRING, 0, 2, b'f', b'r']);
    }

    #[test]
    fn test_on_metadata_layout() {
        let mut props = Properties::new();
        props.set("a", "x");
        let bytes = on_metadata(&props);

        let mut expected = vec![MARKER_STRING, 0, 10];
        expected.extend_from_slice(b"onMetaData");
        expected.extend_from_slice(&[MARKER_ECMA_ARRAY, 0, 0, 0, 1]);
        expected.extend_from_slice(&[0, 1, b'a', MARKER_STRING, 0, 1, b'x']);
        expected.extend_from_slice(&[0, 0, MARKER_OBJECT_END]);
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_empty_properties() {
        let bytes = on_metadata(&Properties::new());
        assert_eq!(&bytes[13..], &[MARKER_ECMA_ARRAY, 0, 0, 0, 0, 0, 0, MARKER_OBJECT_END]);
    }
}
