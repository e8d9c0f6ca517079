//! Content checksums and the compatibility tag.

use sha2::{Digest, Sha256};

/// Version of this compiler, salted into every checksum.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Revision of the persisted artifact layout.
const FORMAT_REVISION: u32 = 1;

/// SHA-256 of `source` salted with the compiler version, as lowercase hex.
pub fn checksum(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(COMPILER_VERSION.as_bytes());
    hex::encode(hasher.finalize())
}

/// Identifies the compiler version and artifact layout a persisted artifact
/// was built for. Artifacts carrying any other tag are never reused.
pub fn compat_tag() -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(b"prep-artifact");
    hasher.update(FORMAT_REVISION.to_le_bytes());
    hasher.update(COMPILER_VERSION.as_bytes());
    let digest = hasher.finalize();
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(checksum("Hello {{x}}"), checksum("Hello {{x}}"));
        assert_eq!(checksum("a").len(), 64);
    }

    #[test]
    fn test_checksum_tracks_content() {
        assert_ne!(checksum("a"), checksum("b"));
    }

    #[test]
    fn test_checksum_is_salted() {
        let plain = hex::encode(Sha256::digest(b"a"));
        assert_ne!(checksum("a"), plain);
    }

    #[test]
    fn test_compat_tag_is_stable() {
        assert_eq!(compat_tag(), compat_tag());
    }
}
