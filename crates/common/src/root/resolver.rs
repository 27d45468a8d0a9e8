use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::linked_data::Link;

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("resolver error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Username -> the content address of that user's published root tree
#[async_trait]
pub trait DataRootResolver: Send + Sync + Debug {
    async fn lookup(&self, username: &str) -> Result<Option<Link>, ResolverError>;
}

/// Username -> the root DID the user publishes for their account
#[async_trait]
pub trait DidResolver: Send + Sync + Debug {
    async fn root_did(&self, username: &str) -> Result<Option<String>, ResolverError>;
}

/// Static resolver over in-memory tables, also used for the CLI's
/// `[identities]` and `[data_roots]` config sections
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    data_roots: Arc<RwLock<HashMap<String, Link>>>,
    root_dids: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_data_root(&self, username: &str, link: Link) -> Result<(), ResolverError> {
        self.data_roots
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e))?
            .insert(username.to_string(), link);
        Ok(())
    }

    pub fn set_root_did(&self, username: &str, did: &str) -> Result<(), ResolverError> {
        self.root_dids
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e))?
            .insert(username.to_string(), did.to_string());
        Ok(())
    }
}

#[async_trait]
impl DataRootResolver for MemoryResolver {
    async fn lookup(&self, username: &str) -> Result<Option<Link>, ResolverError> {
        let roots = self
            .data_roots
            .read()
            .map_err(|e| anyhow::anyhow!("failed to acquire read lock: {}", e))?;
        Ok(roots.get(username).copied())
    }
}

#[async_trait]
impl DidResolver for MemoryResolver {
    async fn root_did(&self, username: &str) -> Result<Option<String>, ResolverError> {
        let dids = self
            .root_dids
            .read()
            .map_err(|e| anyhow::anyhow!("failed to acquire read lock: {}", e))?;
        Ok(dids.get(username).cloned())
    }
}
