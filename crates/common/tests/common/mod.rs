//! Shared test utilities for filesystem, sharing and linking tests
#![allow(dead_code)]

use std::sync::Arc;

use common::crypto::SecretKey;
use common::fs::PrivateFs;
use common::root::MemoryResolver;
use common::share::{ShareOptions, ShareWith, SharedBy};
use common::store::BlobsStore;

/// One identity with its own filesystem
pub struct TestUser {
    pub username: String,
    pub root_key: SecretKey,
    pub exchange_key: SecretKey,
    pub fs: PrivateFs,
}

impl TestUser {
    pub fn shared_by(&self) -> SharedBy {
        SharedBy {
            root_did: self.root_key.did(),
            username: self.username.clone(),
        }
    }

    pub fn share_options(&self, share_with: ShareWith) -> ShareOptions {
        ShareOptions {
            share_with,
            shared_by: self.shared_by(),
        }
    }

    /// Persist the filesystem and publish its root under the username
    pub async fn publish(&self, resolver: &MemoryResolver) {
        let link = self.fs.persist().await.unwrap();
        resolver.set_data_root(&self.username, link).unwrap();
        resolver
            .set_root_did(&self.username, &self.root_key.did())
            .unwrap();
    }
}

/// Set up a shared in-memory blob store and resolver
pub async fn setup_test_env() -> (BlobsStore, MemoryResolver) {
    let blobs = BlobsStore::memory().await.unwrap();
    (blobs, MemoryResolver::new())
}

pub async fn setup_user(username: &str, blobs: &BlobsStore, resolver: &MemoryResolver) -> TestUser {
    let fs = PrivateFs::init(blobs, Arc::new(resolver.clone()))
        .await
        .unwrap();
    TestUser {
        username: username.to_string(),
        root_key: SecretKey::generate(),
        exchange_key: SecretKey::generate(),
        fs,
    }
}
