mod blobs;
mod key_value;

pub use blobs::{BlobsStore, BlobsStoreError, PutResult};
pub use key_value::{FileKeyValueStore, KeyValueStore, KeyValueStoreError, MemoryKeyValueStore};
