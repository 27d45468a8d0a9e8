use std::fmt;

use cid::multibase::Base;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Per-recipient name of a share record.
///
/// `base58btc(sha256(recipient_exchange_did || sender_root_did || counter))`,
/// so a recipient who knows the sender and the counter can recompute it
/// without listing anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareKey(String);

impl ShareKey {
    pub fn create(counter: u64, recipient_exchange_did: &str, sender_root_did: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(recipient_exchange_did.as_bytes());
        hasher.update(sender_root_did.as_bytes());
        hasher.update(counter.to_string().as_bytes());
        Self(Base::Base58Btc.encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Salt used when saturating an entry index's filter
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.0.as_bytes()).into()
    }
}

impl fmt::Display for ShareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ShareKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_share_key_is_deterministic() {
        let a = ShareKey::create(1, "did:key:abc", "did:key:owner");
        let b = ShareKey::create(1, "did:key:abc", "did:key:owner");
        assert_eq!(a, b);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_share_key_varies_with_inputs() {
        let base = ShareKey::create(1, "did:key:abc", "did:key:owner");
        assert_ne!(base, ShareKey::create(2, "did:key:abc", "did:key:owner"));
        assert_ne!(base, ShareKey::create(1, "did:key:xyz", "did:key:owner"));
        assert_ne!(base, ShareKey::create(1, "did:key:abc", "did:key:other"));
    }
}
