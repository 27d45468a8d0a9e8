//! `did:key` encoding for Ed25519 identities.
//!
//! A did:key is the multibase (base58btc) encoding of the multicodec-prefixed
//! public key: `did:key:z` + base58btc(0xed 0x01 || key).

use cid::multibase::{self, Base};

use super::keys::PUBLIC_KEY_SIZE;

pub const DID_KEY_PREFIX: &str = "did:key:";
/// Multicodec varint for an ed25519 public key
pub const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

#[derive(Debug, thiserror::Error)]
pub enum DidError {
    #[error("not a did:key identifier: {0}")]
    NotDidKey(String),
    #[error("multibase decode error: {0}")]
    Multibase(#[from] multibase::Error),
    #[error("unsupported key type, expected ed25519")]
    UnsupportedKeyType,
    #[error("invalid key length {0}")]
    KeyLength(usize),
}

pub fn encode_ed25519(key: &[u8; PUBLIC_KEY_SIZE]) -> String {
    let mut bytes = Vec::with_capacity(ED25519_MULTICODEC.len() + PUBLIC_KEY_SIZE);
    bytes.extend_from_slice(&ED25519_MULTICODEC);
    bytes.extend_from_slice(key);
    format!("{}{}", DID_KEY_PREFIX, multibase::encode(Base::Base58Btc, bytes))
}

pub fn decode_ed25519(did: &str) -> Result<[u8; PUBLIC_KEY_SIZE], DidError> {
    let encoded = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| DidError::NotDidKey(did.to_string()))?;
    let (base, bytes) = multibase::decode(encoded)?;
    if base != Base::Base58Btc {
        return Err(DidError::NotDidKey(did.to_string()));
    }
    let key = bytes
        .strip_prefix(&ED25519_MULTICODEC[..])
        .ok_or(DidError::UnsupportedKeyType)?;
    key.try_into().map_err(|_| DidError::KeyLength(key.len()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_did_key_roundtrip() {
        let key = [9u8; PUBLIC_KEY_SIZE];
        let did = encode_ed25519(&key);
        assert!(did.starts_with("did:key:z6Mk"));
        assert_eq!(decode_ed25519(&did).unwrap(), key);
    }

    #[test]
    fn test_did_key_rejects_other_methods() {
        assert!(matches!(
            decode_ed25519("did:web:example.com"),
            Err(DidError::NotDidKey(_))
        ));
        // secp256k1 multicodec
        let mut bytes = vec![0xe7, 0x01];
        bytes.extend_from_slice(&[1u8; 33]);
        let did = format!("did:key:{}", multibase::encode(Base::Base58Btc, bytes));
        assert!(matches!(
            decode_ed25519(&did),
            Err(DidError::UnsupportedKeyType)
        ));
    }
}
