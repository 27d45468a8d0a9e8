use std::future::IntoFuture;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use anyhow::anyhow;
use bytes::Bytes;
use iroh_blobs::{
    api::{
        blobs::{BlobStatus, Blobs},
        ExportBaoError, RequestError,
    },
    store::{fs::FsStore, mem::MemStore},
    BlobsProtocol,
};

use crate::linked_data::{BlockEncoded, CodecError, DagCborCodec, Link, LD_CBOR_CODEC, LD_RAW_CODEC};

/// Content-addressed block store over a local iroh-blobs store.
///
/// Everything Veil persists goes through here: encrypted node headers,
/// encrypted file content, index trie nodes, root headers and share payloads.
#[derive(Clone, Debug)]
pub struct BlobsStore {
    pub inner: Arc<BlobsProtocol>,
}

impl Deref for BlobsStore {
    type Target = Arc<BlobsProtocol>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BlobsStoreError {
    #[error("blobs store error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("blob not found: {0}")]
    NotFound(Link),
    #[error("blob store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export bao error: {0}")]
    ExportBao(#[from] ExportBaoError),
    #[error("request error: {0}")]
    Request(#[from] RequestError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Address and size of a freshly stored blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutResult {
    pub link: Link,
    pub size: u64,
}

impl BlobsStore {
    pub async fn fs(path: &Path) -> Result<Self, BlobsStoreError> {
        tracing::debug!("BlobsStore::fs loading store at {:?}", path);
        let store = FsStore::load(path).await?;
        let blobs = BlobsProtocol::new(&store, None);
        Ok(Self {
            inner: Arc::new(blobs),
        })
    }

    pub async fn memory() -> Result<Self, BlobsStoreError> {
        let store = MemStore::new();
        let blobs = BlobsProtocol::new(&store, None);
        Ok(Self {
            inner: Arc::new(blobs),
        })
    }

    pub fn blobs(&self) -> &Blobs {
        self.inner.store().blobs()
    }

    /// Flush and close the underlying store. Handles sharing it are unusable
    /// afterwards.
    pub async fn shutdown(&self) -> Result<(), BlobsStoreError> {
        self.inner
            .store()
            .shutdown()
            .await
            .map_err(|e| anyhow!("failed to shut down blob store: {}", e))?;
        Ok(())
    }

    async fn put_with_codec(&self, codec: u64, data: Vec<u8>) -> Result<PutResult, BlobsStoreError> {
        let size = data.len() as u64;
        let hash = self.blobs().add_bytes(data).into_future().await?.hash;
        let link = Link::new(codec, hash);
        tracing::debug!("stored {} bytes at {}", size, link);
        Ok(PutResult { link, size })
    }

    /// Store opaque bytes (typically ciphertext)
    pub async fn put(&self, data: Vec<u8>) -> Result<PutResult, BlobsStoreError> {
        self.put_with_codec(LD_RAW_CODEC, data).await
    }

    /// Store a plaintext DAG-CBOR block
    pub async fn put_cbor<T: BlockEncoded<DagCborCodec>>(
        &self,
        block: &T,
    ) -> Result<PutResult, BlobsStoreError> {
        let data = block.encode()?;
        self.put_with_codec(LD_CBOR_CODEC, data).await
    }

    /// Store a block that was already DAG-CBOR encoded
    pub async fn put_cbor_bytes(&self, data: Vec<u8>) -> Result<PutResult, BlobsStoreError> {
        self.put_with_codec(LD_CBOR_CODEC, data).await
    }

    /// Fetch a blob; absent content is an error
    pub async fn get(&self, link: &Link) -> Result<Bytes, BlobsStoreError> {
        if !self.stat(link).await? {
            return Err(BlobsStoreError::NotFound(*link));
        }
        let bytes = self.blobs().get_bytes(link.hash()).await?;
        Ok(bytes)
    }

    pub async fn get_cbor<T: BlockEncoded<DagCborCodec>>(
        &self,
        link: &Link,
    ) -> Result<T, BlobsStoreError> {
        let bytes = self.get(link).await?;
        Ok(T::decode(&bytes)?)
    }

    /// Whether the blob is fully present locally
    pub async fn stat(&self, link: &Link) -> Result<bool, BlobsStoreError> {
        let stat = self
            .blobs()
            .status(link.hash())
            .await
            .map_err(|err| BlobsStoreError::Default(anyhow!(err)))?;
        Ok(matches!(stat, BlobStatus::Complete { .. }))
    }
}
