use serde::{Deserialize, Serialize};

use crate::crypto::{Secret, SymmAlg};
use crate::linked_data::{BlockEncoded, DagCborCodec, Link};

/// What every recipient of a share gets, sealed to their exchange key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePayload {
    pub entry_index_cid: Link,
    /// Hex encoded entry index key
    pub symm_key: String,
    pub symm_key_algo: SymmAlg,
}

impl BlockEncoded<DagCborCodec> for SharePayload {}

impl SharePayload {
    pub fn new(entry_index: Link, key: &Secret, algo: SymmAlg) -> Self {
        Self {
            entry_index_cid: entry_index,
            symm_key: key.to_hex(),
            symm_key_algo: algo,
        }
    }

    pub fn key(&self) -> Result<Secret, crate::crypto::SecretError> {
        Secret::from_hex(&self.symm_key)
    }
}
