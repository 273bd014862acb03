use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::catalog::FirmwareImage;
use crate::checksum::Digest;
use crate::error::{Error, Result};

/// Length of the little-endian offset echoed in front of each chunk.
pub const CHUNK_HEADER_LEN: usize = 4;

/// A reply ready to be handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Binary(Bytes),
}

#[derive(Serialize)]
struct VersionInfo<'a> {
    ver: &'a str,
    sz: u32,
}

#[derive(Serialize)]
struct Unsupported {
    err: &'static str,
}

/// Chunk reply: offset (little-endian) followed by the payload.
pub fn chunk(offset: u32, payload: &[u8]) -> Reply {
    let mut frame = BytesMut::with_capacity(CHUNK_HEADER_LEN + payload.len());
    frame.put_u32_le(offset);
    frame.put_slice(payload);
    Reply::Binary(frame.freeze())
}

/// Checksum reply: the raw digest, unframed.
pub fn checksum(digest: &Digest) -> Reply {
    Reply::Binary(Bytes::copy_from_slice(digest))
}

/// `{"ver":…,"sz":…}` reply to a JSON version info request.
pub fn version_info_json(image: &FirmwareImage) -> Result<Reply> {
    to_text(&VersionInfo {
        ver: &image.version,
        sz: image.size,
    })
}

/// 8-byte wire descriptor reply to a binary version info request.
pub fn version_info_bin(image: &FirmwareImage) -> Reply {
    Reply::Binary(Bytes::copy_from_slice(&image.wire_descriptor().encode()))
}

/// Notice sent when a device selects a firmware the catalog does not hold.
pub fn unsupported() -> Result<Reply> {
    to_text(&Unsupported { err: "unsupported" })
}

fn to_text(value: &impl Serialize) -> Result<Reply> {
    serde_json::to_string(value)
        .map(Reply::Text)
        .map_err(|e| Error::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_is_prefixed_with_little_endian_offset() {
        let Reply::Binary(frame) = chunk(0x0102_0304, b"abc") else {
            panic!("chunk must be binary");
        };
        assert_eq!(frame.as_ref(), &[0x04, 0x03, 0x02, 0x01, b'a', b'b', b'c']);
    }

    #[test]
    fn empty_chunk_carries_only_the_offset() {
        assert_eq!(chunk(7, &[]), Reply::Binary(Bytes::from_static(&[7, 0, 0, 0])));
    }

    #[test]
    fn version_info_json_uses_short_keys() {
        let image = FirmwareImage::new("fmwA", "v1", "2.0.0", vec![0u8; 1024]).unwrap();
        assert_eq!(
            version_info_json(&image).unwrap(),
            Reply::Text(r#"{"ver":"2.0.0","sz":1024}"#.to_string())
        );
    }

    #[test]
    fn version_info_bin_is_wire_descriptor() {
        let image = FirmwareImage::new("fmwA", "v1", "1.2.3", vec![0u8; 64]).unwrap();
        let Reply::Binary(frame) = version_info_bin(&image) else {
            panic!("binary version info expected");
        };
        assert_eq!(&frame[..4], &10_203u32.to_ne_bytes());
        assert_eq!(&frame[4..], &64u32.to_ne_bytes());
    }

    #[test]
    fn unsupported_notice() {
        assert_eq!(
            unsupported().unwrap(),
            Reply::Text(r#"{"err":"unsupported"}"#.to_string())
        );
    }
}
