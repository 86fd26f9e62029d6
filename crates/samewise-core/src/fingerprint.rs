use blake2::{Blake2b512, Digest};
use std::fmt;

/// Width of a fingerprint in bytes (Blake2b-512).
pub const FINGERPRINT_LEN: usize = 64;

/// Fixed-width content digest.
///
/// Equality implies content equality with overwhelming probability. The
/// derived ordering is byte-wise lexicographic; since every fingerprint has
/// the same width this coincides with the length-then-lexicographic total
/// order the directory aggregate relies on.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Digest a complete in-memory buffer.
    pub fn of_bytes(buf: &[u8]) -> Self {
        let mut hasher = Blake2b512::new();
        hasher.update(buf);
        Self::from_digest(hasher)
    }

    /// Finalise an incremental digest into a fingerprint.
    pub fn from_digest(hasher: Blake2b512) -> Self {
        let digest = hasher.finalize();
        let mut bytes = [0u8; FINGERPRINT_LEN];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }

    /// Aggregate child fingerprints into a directory fingerprint.
    ///
    /// Children are sorted before digesting so the result depends only on
    /// the multiset of fingerprints, never on traversal order or filenames.
    pub fn combine<I>(children: I) -> Self
    where
        I: IntoIterator<Item = Fingerprint>,
    {
        let mut sorted: Vec<Fingerprint> = children.into_iter().collect();
        sorted.sort_unstable();

        let mut hasher = Blake2b512::new();
        for child in &sorted {
            hasher.update(child.as_bytes());
        }
        Self::from_digest(hasher)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Rebuild a fingerprint from stored raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FINGERPRINT_LEN {
            return None;
        }
        let mut out = [0u8; FINGERPRINT_LEN];
        out.copy_from_slice(bytes);
        Some(Fingerprint(out))
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(FINGERPRINT_LEN * 2);
        for byte in &self.0 {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight bytes are plenty for log output.
        write!(
            f,
            "Fingerprint({:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5], self.0[6], self.0[7]
        )
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
