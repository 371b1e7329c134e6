//! CRC-32 content checksums
//!
//! All persisted files carry a CRC-32 of their logical content. The wrapper
//! supports streaming extension so an append-only file can update its
//! checksum from the appended tail alone.

use crc32fast::Hasher;

/// A CRC-32 checksum value.
///
/// `append` resumes the computation from the current value, so
/// `Crc32::new().append(a).append(b)` equals `Crc32::of(a ++ b)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Crc32(u32);

impl Crc32 {
    /// The checksum of empty content.
    pub fn new() -> Self {
        Self(0)
    }

    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Compute the checksum of `bytes` in one shot.
    pub fn of(bytes: &[u8]) -> Self {
        let mut crc = Self::new();
        crc.append(bytes);
        crc
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    /// Extend the checksum with more content bytes.
    pub fn append(&mut self, bytes: &[u8]) -> &mut Self {
        let mut hasher = Hasher::new_with_initial(self.0);
        hasher.update(bytes);
        self.0 = hasher.finalize();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(Crc32::new().get(), 0);
        assert_eq!(Crc32::of(b"").get(), 0);
    }

    #[test]
    fn test_known_value() {
        // CRC-32 of "abcde", cross-checked against zlib.
        assert_eq!(Crc32::of(b"abcde").get(), 2240272485);
    }

    #[test]
    fn test_append_matches_one_shot() {
        let mut streamed = Crc32::new();
        streamed.append(b"abc").append(b"de");
        assert_eq!(streamed, Crc32::of(b"abcde"));
    }

    #[test]
    fn test_append_order_matters() {
        let mut ab = Crc32::new();
        ab.append(b"a").append(b"b");
        let mut ba = Crc32::new();
        ba.append(b"b").append(b"a");
        assert_ne!(ab, ba);
    }
}
