//! Content addressing for everything Veil writes to a blob store.
//!
//! A [`Link`] pairs an IPLD codec with a BLAKE3 digest (the hash iroh-blobs
//! addresses content by). Links render as CIDv1 strings so they can be handed
//! to other peers, and serialize as native CID links inside DAG-CBOR blocks.

use std::fmt;
use std::str::FromStr;

use ipld_core::codec::Codec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use cid::multibase;
pub use cid::Cid;
pub use iroh_blobs::Hash;
pub use serde_ipld_dagcbor::codec::DagCborCodec;

/// Codec for opaque (usually encrypted) byte blobs
pub const LD_RAW_CODEC: u64 = 0x55;
/// Codec for unencrypted DAG-CBOR blocks
pub const LD_CBOR_CODEC: u64 = 0x71;
/// Multihash code for BLAKE3-256
pub const BLAKE3_MULTIHASH_CODE: u64 = 0x1e;

type Multihash = multihash::Multihash<64>;

#[derive(Debug, thiserror::Error)]
pub enum CidError {
    #[error("cid parse error: {0}")]
    Parse(#[from] cid::Error),
    #[error("unsupported multihash code {0:#x}, expected blake3")]
    UnsupportedHash(u64),
    #[error("invalid digest length {0}, expected 32")]
    DigestLength(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// A content address for a blob in the store
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link {
    codec: u64,
    hash: Hash,
}

impl Default for Link {
    fn default() -> Self {
        Link::new(LD_RAW_CODEC, Hash::from_bytes([0; 32]))
    }
}

impl Link {
    pub fn new(codec: u64, hash: Hash) -> Self {
        Self { codec, hash }
    }

    /// Address bytes without storing them
    pub fn for_raw(data: &[u8]) -> Self {
        Self::new(LD_RAW_CODEC, Hash::new(data))
    }

    pub fn for_cbor(data: &[u8]) -> Self {
        Self::new(LD_CBOR_CODEC, Hash::new(data))
    }

    pub fn codec(&self) -> u64 {
        self.codec
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn cid(&self) -> Cid {
        // a 32 byte digest always fits a 64 byte multihash
        let mh = Multihash::wrap(BLAKE3_MULTIHASH_CODE, self.hash.as_bytes())
            .expect("blake3 digest fits in multihash");
        Cid::new_v1(self.codec, mh)
    }
}

impl From<Link> for Cid {
    fn from(link: Link) -> Self {
        link.cid()
    }
}

impl TryFrom<Cid> for Link {
    type Error = CidError;

    fn try_from(cid: Cid) -> Result<Self, Self::Error> {
        let mh = cid.hash();
        if mh.code() != BLAKE3_MULTIHASH_CODE {
            return Err(CidError::UnsupportedHash(mh.code()));
        }
        let digest: [u8; 32] = mh
            .digest()
            .try_into()
            .map_err(|_| CidError::DigestLength(mh.digest().len()))?;
        Ok(Link::new(cid.codec(), Hash::from_bytes(digest)))
    }
}

impl FromStr for Link {
    type Err = CidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Link::try_from(Cid::try_from(s)?)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.cid())
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({})", self.cid())
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.cid().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Link {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let cid = Cid::deserialize(deserializer)?;
        Link::try_from(cid).map_err(serde::de::Error::custom)
    }
}

/// Types that live in the blob store as encoded blocks
pub trait BlockEncoded<C>: Serialize + DeserializeOwned + Sized {
    fn encode(&self) -> Result<Vec<u8>, CodecError>
    where
        C: Codec<Self>,
        <C as Codec<Self>>::Error: fmt::Display,
    {
        C::encode_to_vec(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError>
    where
        C: Codec<Self>,
        <C as Codec<Self>>::Error: fmt::Display,
    {
        C::decode_from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
