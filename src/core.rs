use serde::{Deserialize, Serialize};

/// A 32-byte BLAKE3 hash used for content-addressing.
///
/// In `fei`, this serves two primary purposes:
/// 1. It fingerprints the declared inputs of a task, so that a task invoked
///    with the same inputs in a later pass can be recognized (see
///    [`crate::Memo`]).
/// 2. It generates stable names for artifacts living outside of the process,
///    like particle lists in the emitted pipeline or training files on disk.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for &byte in self.0.iter() {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }

    /// The first 16 hex digits, used inside list and file names.
    pub fn short(self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(16);
        hex
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incremental hasher feeding the CBOR encoding of values into BLAKE3.
///
/// Encoding through `ciborium` instead of `std::hash::Hash` keeps the digest
/// stable across processes and lets floating point configuration take part in
/// the fingerprint.
#[derive(Default)]
pub(crate) struct Blake3Hasher(blake3::Hasher);

impl Blake3Hasher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update<T>(&mut self, value: &T) -> Result<(), ciborium::ser::Error<std::io::Error>>
    where
        T: Serialize + ?Sized,
    {
        ciborium::into_writer(value, &mut self.0)
    }
}

impl From<Blake3Hasher> for Hash32 {
    fn from(value: Blake3Hasher) -> Self {
        let bytes: [u8; 32] = value.0.finalize().into();
        Hash32::from(bytes)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hex() {
        let hash = Hash32::hash(b"K+:FSP");
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash.short(), hex[..16]);
    }

    #[test]
    fn test_hasher_is_stable() {
        let digest = |value: &(&str, i32)| {
            let mut hasher = Blake3Hasher::new();
            hasher.update(value).unwrap();
            Hash32::from(hasher)
        };

        assert_eq!(digest(&("A", 1)), digest(&("A", 1)));
        assert_ne!(digest(&("A", 1)), digest(&("A", 2)));
    }
}
