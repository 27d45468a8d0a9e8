use std::sync::Arc;

use tokio::sync::Mutex;

use crate::crypto::Secret;
use crate::linked_data::Link;
use crate::private::{PrivateDirectory, PrivateLink, PrivateNode, PrivateNodeError};
use crate::root::{DataRootResolver, RootTree, RootTreeError};
use crate::share::{ShareDetails, ShareError, ShareOptions, SharingEngine};
use crate::store::{BlobsStore, BlobsStoreError};

/// Split a posix style path into segments, ignoring empty ones
pub fn path_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("default error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("blobs store error: {0}")]
    BlobsStore(#[from] BlobsStoreError),
    #[error("node error: {0}")]
    Node(#[from] PrivateNodeError),
    #[error("root tree error: {0}")]
    Root(#[from] RootTreeError),
    #[error("share error: {0}")]
    Share(#[from] ShareError),
}

#[derive(Debug, Clone)]
pub struct PrivateFsInner {
    // per-identity aggregate: index, public tree, shares
    pub root: RootTree,
    // decrypted private root directory
    pub root_dir: PrivateDirectory,
    // last persisted root tree, if any
    pub link: Option<Link>,
}

/// One identity's private filesystem: the decrypted root directory, the
/// root tree it is indexed in and the store both live in.
#[derive(Clone)]
pub struct PrivateFs(Arc<Mutex<PrivateFsInner>>, BlobsStore, SharingEngine);

impl PrivateFs {
    /// Fresh filesystem with an empty private root
    pub async fn init(
        blobs: &BlobsStore,
        resolver: Arc<dyn DataRootResolver>,
    ) -> Result<Self, FsError> {
        let mut root = RootTree::new();
        let mut root_dir = PrivateDirectory::create_root(Secret::generate());
        root_dir.put(&mut root.index, blobs).await?;

        let inner = PrivateFsInner {
            root,
            root_dir,
            link: None,
        };
        Ok(Self::from_inner(inner, blobs, resolver))
    }

    /// Open the filesystem stored at `link` with the root's read key
    pub async fn load(
        link: &Link,
        read_key: &Secret,
        blobs: &BlobsStore,
        resolver: Arc<dyn DataRootResolver>,
    ) -> Result<Self, FsError> {
        let root = RootTree::load(link, blobs).await?;
        let root_dir = PrivateDirectory::load_root(read_key, &root.index, blobs).await?;
        tracing::debug!("loaded private root at revision {}", root_dir.revision());

        let inner = PrivateFsInner {
            root,
            root_dir,
            link: Some(*link),
        };
        Ok(Self::from_inner(inner, blobs, resolver))
    }

    fn from_inner(
        inner: PrivateFsInner,
        blobs: &BlobsStore,
        resolver: Arc<dyn DataRootResolver>,
    ) -> Self {
        let engine = SharingEngine::new(blobs.clone(), resolver);
        Self(Arc::new(Mutex::new(inner)), blobs.clone(), engine)
    }

    pub async fn inner(&self) -> PrivateFsInner {
        self.0.lock().await.clone()
    }

    pub fn blobs(&self) -> BlobsStore {
        self.1.clone()
    }

    pub fn sharing(&self) -> &SharingEngine {
        &self.2
    }

    pub async fn link(&self) -> Option<Link> {
        self.0.lock().await.link
    }

    pub async fn read_key(&self) -> Secret {
        self.0.lock().await.root_dir.key().clone()
    }

    pub async fn shared_counter(&self) -> u64 {
        self.0.lock().await.root.shared_counter()
    }

    pub async fn write(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let segments = path_segments(path);
        let mut guard = self.0.lock().await;
        let PrivateFsInner { root, root_dir, .. } = &mut *guard;

        root_dir
            .write_file(&segments, content, &mut root.index, &self.1)
            .await?;
        root_dir.put(&mut root.index, &self.1).await?;
        tracing::debug!("wrote {} bytes to {}", content.len(), path);
        Ok(())
    }

    pub async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        let segments = path_segments(path);
        let mut guard = self.0.lock().await;
        let PrivateFsInner { root, root_dir, .. } = &mut *guard;

        root_dir.mkdir(&segments, &mut root.index, &self.1).await?;
        root_dir.put(&mut root.index, &self.1).await?;
        Ok(())
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let guard = self.0.lock().await;
        Ok(guard
            .root_dir
            .read_file(&path_segments(path), &guard.root.index, &self.1)
            .await?)
    }

    pub async fn get_node(&self, path: &str) -> Result<PrivateNode, FsError> {
        let guard = self.0.lock().await;
        Ok(guard
            .root_dir
            .get_node(&path_segments(path), &guard.root.index, &self.1)
            .await?)
    }

    pub async fn ls(&self, path: &str) -> Result<Vec<(String, PrivateLink)>, FsError> {
        match self.get_node(path).await? {
            PrivateNode::Directory(dir) => Ok(dir.ls()),
            PrivateNode::File(_) => Err(PrivateNodeError::NotADirectory(path.to_string()).into()),
        }
    }

    /// Share the nodes at `paths` and advance the share counter so the next
    /// share derives fresh share keys
    pub async fn share(&self, paths: &[&str], options: ShareOptions) -> Result<ShareDetails, FsError> {
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            let node = self.get_node(path).await?;
            let name = path_segments(path)
                .pop()
                .ok_or_else(|| anyhow::anyhow!("cannot share the root directory"))?;
            items.push((name, node));
        }

        let mut guard = self.0.lock().await;
        let details = self
            .2
            .share_private_node(&mut guard.root, &items, options)
            .await?;
        guard.root.bump_shared_counter();
        Ok(details)
    }

    pub async fn publish_exchange_did(&self, did: &str) {
        self.0.lock().await.root.publish_exchange_did(did);
    }

    /// Store the root tree and remember its link
    pub async fn persist(&self) -> Result<Link, FsError> {
        let mut guard = self.0.lock().await;
        let link = guard.root.persist(&self.1).await?;
        guard.link = Some(link);
        tracing::info!("persisted filesystem root {}", link);
        Ok(link)
    }
}
