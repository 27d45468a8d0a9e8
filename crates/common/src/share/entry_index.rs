use crate::crypto::Secret;
use crate::linked_data::Link;
use crate::private::node::{PrivateNodeError, PrivateNodeHeader};
use crate::private::{BareNameFilter, PrivateDirectory, PrivateLink, PrivateName, PrivateNode, SoftLink};
use crate::store::{BlobsStore, PutResult};

use super::key::ShareKey;

/// A throwaway private directory holding nothing but soft-links.
///
/// One is built per sharing operation under a fresh key; recipients get the
/// key through their sealed payload and follow the soft-links into the
/// owner's private index.
#[derive(Debug, Clone)]
pub struct EntryIndex {
    dir: PrivateDirectory,
}

impl Default for EntryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl EntryIndex {
    pub fn new() -> Self {
        Self {
            dir: PrivateDirectory::create_root(Secret::generate()),
        }
    }

    pub fn key(&self) -> &Secret {
        self.dir.key()
    }

    pub fn bare_name_filter(&self) -> &BareNameFilter {
        self.dir.bare_name_filter()
    }

    pub fn insert_soft_link(&mut self, name: &str, item: &PrivateNode, username: &str) -> SoftLink {
        self.dir.insert_soft_link(name, item, username)
    }

    pub fn soft_links(&self) -> Vec<SoftLink> {
        self.dir
            .ls()
            .into_iter()
            .filter_map(|(_, link)| match link {
                PrivateLink::SoftLink(soft) => Some(soft),
                PrivateLink::Child(_) => None,
            })
            .collect()
    }

    /// Encrypt the header with the index key and store it
    pub async fn store(&self, blobs: &BlobsStore) -> Result<PutResult, PrivateNodeError> {
        self.dir.store_header(blobs).await
    }

    pub async fn load(link: &Link, key: &Secret, blobs: &BlobsStore) -> Result<Self, PrivateNodeError> {
        match PrivateNodeHeader::open(link, key, blobs).await? {
            PrivateNodeHeader::Directory(header) => {
                let mut dir = PrivateDirectory::create_root(key.clone());
                for (name, entry) in header.entries {
                    match entry {
                        PrivateLink::SoftLink(_) => dir.set_entry(name, entry),
                        PrivateLink::Child(_) => {
                            return Err(anyhow::anyhow!("entry index holds a non soft-link entry: {}", name).into())
                        }
                    }
                }
                Ok(Self { dir })
            }
            PrivateNodeHeader::File(_) => {
                Err(PrivateNodeError::NotADirectory("entry index".to_string()))
            }
        }
    }
}

/// Index key anchoring an entry index in its owner's private index
pub fn namefilter(bare: &BareNameFilter, share_key: &ShareKey) -> PrivateName {
    bare.saturate(&share_key.digest())
}
