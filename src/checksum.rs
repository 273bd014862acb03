use md5::{Digest as _, Md5};

/// Length of a firmware content digest.
pub const DIGEST_LEN: usize = 16;

pub type Digest = [u8; DIGEST_LEN];

/// Computes the MD5 digest devices use to verify a downloaded image.
pub fn compute(content: &[u8]) -> Digest {
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&Md5::digest(content));
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(digest: &Digest) -> String {
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn matches_known_md5_vectors() {
        assert_eq!(hex(&compute(b"")), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hex(&compute(b"abc")), "900150983cd24fb0d6963f7d28e17f72");
    }
}
