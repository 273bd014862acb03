//! Firmware descriptor formats.
//!
//! Two layouts exist and must not be confused:
//! - the on-disk descriptor stored next to each binary image: a 4-byte size
//!   followed by the raw UTF-8 version string (no length, no terminator);
//! - the 8-byte wire descriptor sent to devices: encoded version integer
//!   followed by the size.
//!
//! Both use native byte order.

use crate::error::{Error, Result};

/// Length of the size field that prefixes an on-disk descriptor.
pub const SIZE_FIELD_LEN: usize = 4;

/// Length of the wire descriptor.
pub const WIRE_DESCRIPTOR_LEN: usize = 8;

/// On-disk descriptor accompanying a binary image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub size: u32,
    pub version: String,
}

impl Descriptor {
    pub fn new(size: u32, version: impl Into<String>) -> Self {
        Self {
            size,
            version: version.into(),
        }
    }

    /// Decodes an on-disk descriptor. The version string spans every byte
    /// after the size field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptDescriptor`] if fewer than 4 bytes are given or
    /// the version bytes are not valid UTF-8.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let Some((size, version)) = bytes.split_first_chunk::<SIZE_FIELD_LEN>() else {
            return Err(Error::CorruptDescriptor(format!(
                "expected at least {SIZE_FIELD_LEN} bytes, got {}",
                bytes.len()
            )));
        };

        let version = std::str::from_utf8(version)
            .map_err(|e| Error::CorruptDescriptor(format!("version is not UTF-8: {e}")))?;

        Ok(Self {
            size: u32::from_ne_bytes(*size),
            version: version.to_string(),
        })
    }

    /// Encodes the on-disk layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SIZE_FIELD_LEN + self.version.len());
        bytes.extend_from_slice(&self.size.to_ne_bytes());
        bytes.extend_from_slice(self.version.as_bytes());
        bytes
    }
}

/// Descriptor as sent to devices in reply to a binary `ver_info` request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireDescriptor {
    pub version: u32,
    pub size: u32,
}

impl WireDescriptor {
    pub fn encode(&self) -> [u8; WIRE_DESCRIPTOR_LEN] {
        let mut bytes = [0u8; WIRE_DESCRIPTOR_LEN];
        bytes[..4].copy_from_slice(&self.version.to_ne_bytes());
        bytes[4..].copy_from_slice(&self.size.to_ne_bytes());
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_size_and_remaining_bytes_as_version() {
        let mut raw = 1024u32.to_ne_bytes().to_vec();
        raw.extend_from_slice(b"2.0.0");

        let descriptor = Descriptor::decode(&raw).unwrap();
        assert_eq!(descriptor, Descriptor::new(1024, "2.0.0"));
    }

    #[test]
    fn round_trips_on_disk_layout() {
        for (size, version) in [(0, ""), (1, "1"), (u32::MAX, "10.20.30"), (4096, "0.0.1")] {
            let descriptor = Descriptor::new(size, version);
            let encoded = descriptor.encode();
            assert_eq!(encoded.len(), SIZE_FIELD_LEN + version.len());
            assert_eq!(Descriptor::decode(&encoded).unwrap(), descriptor);
        }
    }

    #[test]
    fn rejects_short_descriptor() {
        for len in 0..SIZE_FIELD_LEN {
            let raw = vec![0u8; len];
            assert!(matches!(
                Descriptor::decode(&raw),
                Err(Error::CorruptDescriptor(_))
            ));
        }
    }

    #[test]
    fn rejects_invalid_utf8_version() {
        let mut raw = 16u32.to_ne_bytes().to_vec();
        raw.extend_from_slice(&[0xFF, 0xFE]);
        assert!(matches!(
            Descriptor::decode(&raw),
            Err(Error::CorruptDescriptor(_))
        ));
    }

    #[test]
    fn wire_descriptor_is_version_then_size() {
        let wire = WireDescriptor {
            version: 20_000,
            size: 1024,
        }
        .encode();

        assert_eq!(&wire[..4], &20_000u32.to_ne_bytes());
        assert_eq!(&wire[4..], &1024u32.to_ne_bytes());
    }
}
