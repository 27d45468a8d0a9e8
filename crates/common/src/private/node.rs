use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::{Secret, SecretError};
use crate::linked_data::{BlockEncoded, CodecError, DagCborCodec, Link};
use crate::store::{BlobsStore, BlobsStoreError, PutResult};

use super::index::{PrivateIndex, PrivateIndexError};
use super::metadata::Metadata;
use super::namefilter::{add_to_filter, BareNameFilter, PrivateName};

/**
 * Private nodes
 * =============
 * Every file and directory has its own key and bare name filter. A node
 *  is stored as a DAG-CBOR header encrypted with its key, and every `put`
 *  mints a new revision: the header is re-encrypted, stored, and the new
 *  address is registered in the private index under
 *  `saturate(bare_name_filter, revision_context(key, revision))`.
 * Readers holding the key and filter find the latest revision by probing
 *  the index; nobody else can tell which index entries belong together.
 */

#[derive(Debug, thiserror::Error)]
pub enum PrivateNodeError {
    #[error("private node error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("blobs store error: {0}")]
    Blobs(#[from] BlobsStoreError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("private index error: {0}")]
    Index(#[from] PrivateIndexError),
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("no revision of this node in the private index")]
    MissingRevision,
}

/// Context the bare filter is saturated with for a given revision
pub fn revision_context(key: &Secret, revision: u64) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(key.bytes());
    hasher.update(&revision.to_be_bytes());
    *hasher.finalize().as_bytes()
}

pub fn revision_name(bare: &BareNameFilter, key: &Secret, revision: u64) -> PrivateName {
    bare.saturate(&revision_context(key, revision))
}

/// Find the newest revision at or after `hint`.
///
/// Revisions are registered contiguously, so probe forward in growing steps
/// until one is missing, then binary search the gap.
pub fn find_latest_revision(
    index: &PrivateIndex,
    bare: &BareNameFilter,
    key: &Secret,
    hint: u64,
) -> Option<(u64, Link)> {
    let lookup = |r: u64| index.get(&revision_name(bare, key, r));

    let hint = hint.max(1);
    let mut found = (hint, lookup(hint)?);
    let mut step = 1u64;
    let missing = loop {
        let probe = found.0.saturating_add(step);
        match lookup(probe) {
            Some(link) => {
                found = (probe, link);
                step = step.saturating_mul(2);
            }
            None => break probe,
        }
    };

    let (mut lo, mut hi) = (found.0, missing);
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        match lookup(mid) {
            Some(link) => {
                lo = mid;
                found = (mid, link);
            }
            None => hi = mid,
        }
    }
    Some(found)
}

/// A directory entry pointing at a node the owner controls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildLink {
    pub key: Secret,
    pub bare_name_filter: BareNameFilter,
    /// Revision current when the entry was written; newer ones may exist
    pub revision: u64,
    pub is_file: bool,
}

/// A directory entry pointing into someone's private index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftLink {
    pub key: Secret,
    pub name: String,
    pub bare_name_filter: BareNameFilter,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrivateLink {
    Child(ChildLink),
    SoftLink(SoftLink),
}

impl PrivateLink {
    pub fn is_file(&self) -> Option<bool> {
        match self {
            PrivateLink::Child(child) => Some(child.is_file),
            PrivateLink::SoftLink(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub metadata: Metadata,
    pub bare_name_filter: BareNameFilter,
    pub revision: u64,
    pub previous: Option<Link>,
    /// Content encrypted with the file's key
    pub content: Link,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryHeader {
    pub metadata: Metadata,
    pub bare_name_filter: BareNameFilter,
    pub revision: u64,
    pub previous: Option<Link>,
    pub entries: BTreeMap<String, PrivateLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrivateNodeHeader {
    File(FileHeader),
    Directory(DirectoryHeader),
}

impl BlockEncoded<DagCborCodec> for PrivateNodeHeader {}

impl PrivateNodeHeader {
    pub async fn seal(
        &self,
        key: &Secret,
        blobs: &BlobsStore,
    ) -> Result<PutResult, PrivateNodeError> {
        let ciphertext = key.encrypt(&self.encode()?)?;
        Ok(blobs.put(ciphertext).await?)
    }

    pub async fn open(
        link: &Link,
        key: &Secret,
        blobs: &BlobsStore,
    ) -> Result<Self, PrivateNodeError> {
        let ciphertext = blobs.get(link).await?;
        let plaintext = key.decrypt(&ciphertext)?;
        Ok(Self::decode(&plaintext)?)
    }
}

#[derive(Debug, Clone)]
pub struct PrivateFile {
    key: Secret,
    header: FileHeader,
    persisted: Option<Link>,
}

impl PrivateFile {
    pub async fn create(
        parent: &BareNameFilter,
        name: &str,
        content: &[u8],
        blobs: &BlobsStore,
    ) -> Result<Self, PrivateNodeError> {
        let key = Secret::generate();
        let stored = blobs.put(key.encrypt(content)?).await?;
        Ok(Self {
            header: FileHeader {
                metadata: Metadata::new_file(name),
                bare_name_filter: add_to_filter(parent, &key),
                revision: 0,
                previous: None,
                content: stored.link,
                size: content.len() as u64,
            },
            key,
            persisted: None,
        })
    }

    pub async fn update(&mut self, content: &[u8], blobs: &BlobsStore) -> Result<(), PrivateNodeError> {
        let stored = blobs.put(self.key.encrypt(content)?).await?;
        self.header.content = stored.link;
        self.header.size = content.len() as u64;
        self.header.metadata.touch();
        Ok(())
    }

    pub async fn read(&self, blobs: &BlobsStore) -> Result<Vec<u8>, PrivateNodeError> {
        let ciphertext = blobs.get(&self.header.content).await?;
        Ok(self.key.decrypt(&ciphertext)?)
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub async fn put(
        &mut self,
        index: &mut PrivateIndex,
        blobs: &BlobsStore,
    ) -> Result<Link, PrivateNodeError> {
        self.header.revision += 1;
        self.header.previous = self.persisted;
        let header = PrivateNodeHeader::File(self.header.clone());
        let stored = header.seal(&self.key, blobs).await?;
        index.add(self.private_name(), stored.link);
        self.persisted = Some(stored.link);
        Ok(stored.link)
    }
}

#[derive(Debug, Clone)]
pub struct PrivateDirectory {
    key: Secret,
    header: DirectoryHeader,
    persisted: Option<Link>,
}

fn not_found(path: &[String]) -> PrivateNodeError {
    PrivateNodeError::NotFound(path.join("/"))
}

impl PrivateDirectory {
    fn with_filter(key: Secret, bare_name_filter: BareNameFilter) -> Self {
        Self {
            key,
            header: DirectoryHeader {
                metadata: Metadata::new_directory(),
                bare_name_filter,
                revision: 0,
                previous: None,
                entries: BTreeMap::new(),
            },
            persisted: None,
        }
    }

    /// A root directory: its filter is seeded from its own key
    pub fn create_root(key: Secret) -> Self {
        let bare = BareNameFilter::from_key(&key);
        Self::with_filter(key, bare)
    }

    pub fn new_child(parent: &BareNameFilter) -> Self {
        let key = Secret::generate();
        let bare = add_to_filter(parent, &key);
        Self::with_filter(key, bare)
    }

    pub fn header(&self) -> &DirectoryHeader {
        &self.header
    }

    pub fn ls(&self) -> Vec<(String, PrivateLink)> {
        self.header
            .entries
            .iter()
            .map(|(name, link)| (name.clone(), link.clone()))
            .collect()
    }

    pub fn get_entry(&self, name: &str) -> Option<&PrivateLink> {
        self.header.entries.get(name)
    }

    pub fn set_entry(&mut self, name: String, link: PrivateLink) {
        self.header.entries.insert(name, link);
        self.header.metadata.touch();
    }

    pub fn remove_entry(&mut self, name: &str) -> Option<PrivateLink> {
        let removed = self.header.entries.remove(name);
        if removed.is_some() {
            self.header.metadata.touch();
        }
        removed
    }

    /// Record a soft-link to `item` under `name`.
    ///
    /// The link carries the item's key and its bare filter (its identity in
    /// its owner's filter chain), which is all a reader needs to find the
    /// item's latest revision in the owner's index.
    pub fn insert_soft_link(&mut self, name: &str, item: &PrivateNode, username: &str) -> SoftLink {
        let soft_link = SoftLink {
            key: item.key().clone(),
            name: name.to_string(),
            bare_name_filter: item.bare_name_filter().clone(),
            username: username.to_string(),
        };
        self.set_entry(name.to_string(), PrivateLink::SoftLink(soft_link.clone()));
        soft_link
    }

    /// Encrypt and store the current header without minting a revision
    pub async fn store_header(&self, blobs: &BlobsStore) -> Result<PutResult, PrivateNodeError> {
        PrivateNodeHeader::Directory(self.header.clone())
            .seal(&self.key, blobs)
            .await
    }

    pub async fn put(
        &mut self,
        index: &mut PrivateIndex,
        blobs: &BlobsStore,
    ) -> Result<Link, PrivateNodeError> {
        self.header.revision += 1;
        self.header.previous = self.persisted;
        let stored = self.store_header(blobs).await?;
        index.add(self.private_name(), stored.link);
        self.persisted = Some(stored.link);
        Ok(stored.link)
    }

    pub async fn load_root(
        key: &Secret,
        index: &PrivateIndex,
        blobs: &BlobsStore,
    ) -> Result<Self, PrivateNodeError> {
        let bare = BareNameFilter::from_key(key);
        match PrivateNode::load(key, &bare, 1, index, blobs).await? {
            PrivateNode::Directory(dir) => Ok(dir),
            PrivateNode::File(_) => Err(PrivateNodeError::NotADirectory("/".to_string())),
        }
    }

    /// Load the directories along `segments`, optionally creating missing ones
    async fn walk(
        &self,
        segments: &[String],
        create: bool,
        index: &PrivateIndex,
        blobs: &BlobsStore,
    ) -> Result<Vec<(String, PrivateDirectory)>, PrivateNodeError> {
        let mut chain: Vec<(String, PrivateDirectory)> = Vec::with_capacity(segments.len());
        for (depth, segment) in segments.iter().enumerate() {
            let child = {
                let parent = chain.last().map(|(_, d)| d).unwrap_or(self);
                match parent.get_entry(segment) {
                    Some(PrivateLink::Child(link)) if !link.is_file => {
                        match PrivateNode::load_child(link, index, blobs).await? {
                            PrivateNode::Directory(dir) => dir,
                            PrivateNode::File(_) => {
                                return Err(PrivateNodeError::NotADirectory(
                                    segments[..=depth].join("/"),
                                ))
                            }
                        }
                    }
                    Some(_) => {
                        return Err(PrivateNodeError::NotADirectory(
                            segments[..=depth].join("/"),
                        ))
                    }
                    None if create => PrivateDirectory::new_child(&parent.header.bare_name_filter),
                    None => return Err(not_found(&segments[..=depth])),
                }
            };
            chain.push((segment.clone(), child));
        }
        Ok(chain)
    }

    /// Put each directory in `chain` bottom-up, linking it into its parent
    async fn unwind(
        &mut self,
        mut chain: Vec<(String, PrivateDirectory)>,
        mut entry: (String, PrivateLink),
        index: &mut PrivateIndex,
        blobs: &BlobsStore,
    ) -> Result<(), PrivateNodeError> {
        while let Some((segment, mut dir)) = chain.pop() {
            dir.set_entry(entry.0, entry.1);
            dir.put(index, blobs).await?;
            entry = (segment, dir.child_link());
        }
        self.set_entry(entry.0, entry.1);
        Ok(())
    }

    /// Write `content` at `path`, creating parents as needed.
    ///
    /// Every touched directory below `self` is put; `self` is left for the
    /// caller to put.
    pub async fn write_file(
        &mut self,
        path: &[String],
        content: &[u8],
        index: &mut PrivateIndex,
        blobs: &BlobsStore,
    ) -> Result<PrivateFile, PrivateNodeError> {
        let (name, parents) = path.split_last().ok_or_else(|| not_found(path))?;
        let chain = self.walk(parents, true, index, blobs).await?;

        let parent = chain.last().map(|(_, d)| d).unwrap_or(&*self);
        let mut file = match parent.get_entry(name) {
            Some(PrivateLink::Child(link)) if link.is_file => {
                match PrivateNode::load_child(link, index, blobs).await? {
                    PrivateNode::File(mut file) => {
                        file.update(content, blobs).await?;
                        file
                    }
                    PrivateNode::Directory(_) => return Err(PrivateNodeError::NotAFile(path.join("/"))),
                }
            }
            Some(_) => return Err(PrivateNodeError::NotAFile(path.join("/"))),
            None => {
                PrivateFile::create(&parent.header.bare_name_filter, name, content, blobs).await?
            }
        };
        file.put(index, blobs).await?;

        let entry = (name.clone(), file.child_link());
        self.unwind(chain, entry, index, blobs).await?;
        Ok(file)
    }

    /// Create the directory at `path`; existing directories are left alone
    pub async fn mkdir(
        &mut self,
        path: &[String],
        index: &mut PrivateIndex,
        blobs: &BlobsStore,
    ) -> Result<(), PrivateNodeError> {
        if path.is_empty() {
            return Ok(());
        }
        if let Ok(PrivateNode::Directory(_)) = self.get_node(path, index, blobs).await {
            return Ok(());
        }
        let (name, parents) = path.split_last().ok_or_else(|| not_found(path))?;
        let chain = self.walk(parents, true, index, blobs).await?;

        let parent = chain.last().map(|(_, d)| d).unwrap_or(&*self);
        if parent.get_entry(name).is_some() {
            return Err(PrivateNodeError::NotADirectory(path.join("/")));
        }
        let mut dir = PrivateDirectory::new_child(&parent.header.bare_name_filter);
        dir.put(index, blobs).await?;

        let entry = (name.clone(), dir.child_link());
        self.unwind(chain, entry, index, blobs).await
    }

    /// Resolve `path` to a node; the empty path is `self`
    pub async fn get_node(
        &self,
        path: &[String],
        index: &PrivateIndex,
        blobs: &BlobsStore,
    ) -> Result<PrivateNode, PrivateNodeError> {
        let Some((name, parents)) = path.split_last() else {
            return Ok(PrivateNode::Directory(self.clone()));
        };
        let chain = self.walk(parents, false, index, blobs).await?;
        let parent = chain.last().map(|(_, d)| d).unwrap_or(self);
        match parent.get_entry(name) {
            Some(PrivateLink::Child(link)) => PrivateNode::load_child(link, index, blobs).await,
            Some(PrivateLink::SoftLink(link)) => {
                PrivateNode::load(&link.key, &link.bare_name_filter, 1, index, blobs).await
            }
            None => Err(not_found(path)),
        }
    }

    pub async fn read_file(
        &self,
        path: &[String],
        index: &PrivateIndex,
        blobs: &BlobsStore,
    ) -> Result<Vec<u8>, PrivateNodeError> {
        match self.get_node(path, index, blobs).await? {
            PrivateNode::File(file) => file.read(blobs).await,
            PrivateNode::Directory(_) => Err(PrivateNodeError::NotAFile(path.join("/"))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PrivateNode {
    File(PrivateFile),
    Directory(PrivateDirectory),
}

macro_rules! node_accessors {
    ($($ty:ty),*) => {$(
        impl $ty {
            pub fn key(&self) -> &Secret {
                &self.key
            }

            pub fn bare_name_filter(&self) -> &BareNameFilter {
                &self.header.bare_name_filter
            }

            pub fn revision(&self) -> u64 {
                self.header.revision
            }

            /// Address of the last stored revision
            pub fn persisted(&self) -> Option<Link> {
                self.persisted
            }

            /// Index key of the current revision
            pub fn private_name(&self) -> PrivateName {
                revision_name(&self.header.bare_name_filter, &self.key, self.header.revision)
            }

            pub fn child_link(&self) -> PrivateLink {
                PrivateLink::Child(ChildLink {
                    key: self.key.clone(),
                    bare_name_filter: self.header.bare_name_filter.clone(),
                    revision: self.header.revision,
                    is_file: self.header.metadata.is_file,
                })
            }
        }
    )*};
}

node_accessors!(PrivateFile, PrivateDirectory);

impl PrivateNode {
    pub fn key(&self) -> &Secret {
        match self {
            PrivateNode::File(f) => f.key(),
            PrivateNode::Directory(d) => d.key(),
        }
    }

    pub fn bare_name_filter(&self) -> &BareNameFilter {
        match self {
            PrivateNode::File(f) => f.bare_name_filter(),
            PrivateNode::Directory(d) => d.bare_name_filter(),
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            PrivateNode::File(f) => f.revision(),
            PrivateNode::Directory(d) => d.revision(),
        }
    }

    pub fn private_name(&self) -> PrivateName {
        match self {
            PrivateNode::File(f) => f.private_name(),
            PrivateNode::Directory(d) => d.private_name(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, PrivateNode::File(_))
    }

    pub async fn load_child(
        link: &ChildLink,
        index: &PrivateIndex,
        blobs: &BlobsStore,
    ) -> Result<Self, PrivateNodeError> {
        Self::load(&link.key, &link.bare_name_filter, link.revision, index, blobs).await
    }

    /// Load the latest revision at or after `hint`
    pub async fn load(
        key: &Secret,
        bare: &BareNameFilter,
        hint: u64,
        index: &PrivateIndex,
        blobs: &BlobsStore,
    ) -> Result<Self, PrivateNodeError> {
        let (_, link) =
            find_latest_revision(index, bare, key, hint).ok_or(PrivateNodeError::MissingRevision)?;
        let node = match PrivateNodeHeader::open(&link, key, blobs).await? {
            PrivateNodeHeader::File(header) => PrivateNode::File(PrivateFile {
                key: key.clone(),
                header,
                persisted: Some(link),
            }),
            PrivateNodeHeader::Directory(header) => PrivateNode::Directory(PrivateDirectory {
                key: key.clone(),
                header,
                persisted: Some(link),
            }),
        };
        if node.bare_name_filter() != bare {
            return Err(anyhow::anyhow!("node header does not match its name filter").into());
        }
        Ok(node)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        p.split('/').map(String::from).collect()
    }

    #[test]
    fn test_find_latest_revision_probes_forward() {
        let key = Secret::generate();
        let bare = BareNameFilter::from_key(&key);
        let mut index = PrivateIndex::new();
        for r in 1..=37u64 {
            index.add(revision_name(&bare, &key, r), Link::for_raw(&r.to_be_bytes()));
        }
        let (rev, link) = find_latest_revision(&index, &bare, &key, 3).unwrap();
        assert_eq!(rev, 37);
        assert_eq!(link, Link::for_raw(&37u64.to_be_bytes()));
        assert!(find_latest_revision(&index, &bare, &Secret::generate(), 1).is_none());
    }

    #[tokio::test]
    async fn test_header_seal_open() {
        let blobs = BlobsStore::memory().await.unwrap();
        let mut dir = PrivateDirectory::create_root(Secret::generate());
        let file = PrivateFile::create(dir.bare_name_filter(), "a.txt", b"a", &blobs)
            .await
            .unwrap();
        dir.set_entry("a.txt".into(), file.child_link());

        let stored = dir.store_header(&blobs).await.unwrap();
        let opened = PrivateNodeHeader::open(&stored.link, dir.key(), &blobs)
            .await
            .unwrap();
        assert_eq!(opened, PrivateNodeHeader::Directory(dir.header().clone()));
        assert!(PrivateNodeHeader::open(&stored.link, &Secret::generate(), &blobs)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_put_mints_revisions() {
        let blobs = BlobsStore::memory().await.unwrap();
        let mut index = PrivateIndex::new();
        let key = Secret::generate();
        let mut root = PrivateDirectory::create_root(key.clone());

        let first = root.put(&mut index, &blobs).await.unwrap();
        let first_name = root.private_name();
        let second = root.put(&mut index, &blobs).await.unwrap();
        assert_ne!(first_name, root.private_name());
        assert_eq!(root.revision(), 2);
        assert_eq!(root.header().previous, Some(first));
        assert_eq!(index.get(&root.private_name()), Some(second));

        let loaded = PrivateDirectory::load_root(&key, &index, &blobs).await.unwrap();
        assert_eq!(loaded.revision(), 2);
        assert_eq!(loaded.persisted(), Some(second));
    }

    #[tokio::test]
    async fn test_nested_write_and_read() {
        let blobs = BlobsStore::memory().await.unwrap();
        let mut index = PrivateIndex::new();
        let key = Secret::generate();
        let mut root = PrivateDirectory::create_root(key.clone());

        root.write_file(&path("docs/notes/todo.md"), b"v1", &mut index, &blobs)
            .await
            .unwrap();
        root.write_file(&path("docs/notes/todo.md"), b"v2", &mut index, &blobs)
            .await
            .unwrap();
        root.mkdir(&path("pics"), &mut index, &blobs).await.unwrap();
        root.put(&mut index, &blobs).await.unwrap();

        let reloaded = PrivateDirectory::load_root(&key, &index, &blobs).await.unwrap();
        let names: Vec<String> = reloaded.ls().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["docs".to_string(), "pics".to_string()]);
        let content = reloaded
            .read_file(&path("docs/notes/todo.md"), &index, &blobs)
            .await
            .unwrap();
        assert_eq!(content, b"v2");

        let file = reloaded
            .get_node(&path("docs/notes/todo.md"), &index, &blobs)
            .await
            .unwrap();
        assert_eq!(file.revision(), 2);
        assert!(file.is_file());

        assert!(matches!(
            reloaded.read_file(&path("docs/missing"), &index, &blobs).await,
            Err(PrivateNodeError::NotFound(_))
        ));
        assert!(matches!(
            reloaded.read_file(&path("docs"), &index, &blobs).await,
            Err(PrivateNodeError::NotAFile(_))
        ));
    }
}
