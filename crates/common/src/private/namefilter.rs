//! Bare name filters: a 1024 bit bloom accumulator over a node's ancestry.
//!
//! A child's filter is its parent's filter with the child's key added, so the
//! filter encodes the whole path without revealing it. Saturating a filter
//! with a context (a revision, a share key) yields the [`PrivateName`] under
//! which a particular revision is indexed; different contexts give unrelated
//! names, so successive writes to one path cannot be correlated.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::Secret;

pub const FILTER_BITS: usize = 1024;
pub const FILTER_BYTES: usize = FILTER_BITS / 8;
/// Bits set per added element
pub const HASH_COUNT: usize = 16;
/// Target popcount of a saturated filter
pub const SATURATION_THRESHOLD: u32 = 320;
/// Upper bound on saturation rounds
pub const MAX_SATURATION_ROUNDS: usize = 64;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BareNameFilter([u8; FILTER_BYTES]);

impl Default for BareNameFilter {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for BareNameFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BareNameFilter({} bits)", self.count_ones())
    }
}

impl Serialize for BareNameFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BareNameFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BareNameFilter::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

fn bit_indices(element: &[u8]) -> [usize; HASH_COUNT] {
    let mut stream = [0u8; HASH_COUNT * 2];
    blake3::Hasher::new()
        .update(element)
        .finalize_xof()
        .fill(&mut stream);

    let mut indices = [0usize; HASH_COUNT];
    for (i, pair) in stream.chunks_exact(2).enumerate() {
        indices[i] = u16::from_le_bytes([pair[0], pair[1]]) as usize % FILTER_BITS;
    }
    indices
}

impl BareNameFilter {
    pub fn empty() -> Self {
        Self([0; FILTER_BYTES])
    }

    /// The filter for a root directory: an empty filter seeded with its key
    pub fn from_key(key: &Secret) -> Self {
        Self::empty().add(key.bytes())
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut buff = [0; FILTER_BYTES];
        hex::decode_to_slice(s, &mut buff)?;
        Ok(Self(buff))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn bytes(&self) -> &[u8; FILTER_BYTES] {
        &self.0
    }

    pub fn count_ones(&self) -> u32 {
        self.0.iter().map(|b| b.count_ones()).sum()
    }

    pub fn contains(&self, element: &[u8]) -> bool {
        bit_indices(element)
            .iter()
            .all(|&i| self.0[i / 8] & (1 << (i % 8)) != 0)
    }

    /// Set the bits for `element`; OR-ing makes this idempotent
    pub fn add(mut self, element: &[u8]) -> Self {
        for i in bit_indices(element) {
            self.0[i / 8] |= 1 << (i % 8);
        }
        self
    }

    /// Saturate under `context` and name the result
    pub fn saturate(&self, context: &[u8]) -> PrivateName {
        let mut filter = self.clone().add(context);
        for _ in 0..MAX_SATURATION_ROUNDS {
            if filter.count_ones() >= SATURATION_THRESHOLD {
                break;
            }
            let digest = blake3::hash(&filter.0);
            let next = filter.clone().add(digest.as_bytes());
            if next.count_ones() > SATURATION_THRESHOLD || next == filter {
                break;
            }
            filter = next;
        }
        PrivateName::from_saturated(&filter)
    }
}

/// Add a child's key to its parent's filter
pub fn add_to_filter(bare: &BareNameFilter, secret: &Secret) -> BareNameFilter {
    bare.clone().add(secret.bytes())
}

pub fn saturate(bare: &BareNameFilter, context: &[u8]) -> PrivateName {
    bare.saturate(context)
}

/// The index key of one revision of one node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivateName(String);

impl PrivateName {
    fn from_saturated(filter: &BareNameFilter) -> Self {
        Self(blake3::hash(&filter.0).to_hex().to_string())
    }

    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then(|| Self(s.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrivateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_add_is_deterministic_and_idempotent() {
        let key = Secret::generate();
        let root = BareNameFilter::from_key(&Secret::generate());
        let once = add_to_filter(&root, &key);
        let twice = add_to_filter(&once, &key);
        assert_eq!(once, twice);
        assert_eq!(once, add_to_filter(&root, &key));
        assert!(once.contains(key.bytes()));
        assert!(once.count_ones() <= 2 * HASH_COUNT as u32);
    }

    #[test]
    fn test_saturate_separates_contexts() {
        let bare = BareNameFilter::from_key(&Secret::generate());
        let a = bare.saturate(b"revision-1");
        let b = bare.saturate(b"revision-2");
        assert_ne!(a, b);
        assert_eq!(a, bare.saturate(b"revision-1"));
        assert!(PrivateName::parse(a.as_str()).is_some());
    }

    #[test]
    fn test_saturation_terminates_on_full_filter() {
        let full = BareNameFilter([0xff; FILTER_BYTES]);
        assert_eq!(full.count_ones(), FILTER_BITS as u32);
        // distinct contexts still collapse here, the name only depends on the bits
        assert_eq!(full.saturate(b"a"), full.saturate(b"b"));
    }

    #[test]
    fn test_hex_serde() {
        let bare = BareNameFilter::from_key(&Secret::generate());
        let json = serde_json::to_string(&bare).unwrap();
        let back: BareNameFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bare);
    }
}
