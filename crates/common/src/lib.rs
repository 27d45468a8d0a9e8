/**
 * Device linking and credential import.
 *  Consumer and producer sides of handing
 *  an account over to a new device.
 */
pub mod auth;
/**
 * Cryptographic types and operations.
 *  - Public and Private key implementations
 *  - did:key identities
 *  - Key-to-key key sharing and sealed payloads
 */
pub mod crypto;
/**
 * A private filesystem bound to one identity.
 *  Ties the private tree, the root tree and
 *  sharing together over one blobs store.
 */
pub mod fs;
/**
 * Internal wrapper around IPLD, renamed to
 *  something a little more down-to-earth.
 * Handles translation to/from IPLD and IrohBlobs
 *  for linked data.
 */
pub mod linked_data;
/**
 * Encrypted, name-obfuscated files and directories,
 *  and the index that maps obfuscated names
 *  to content.
 */
pub mod private;
pub mod retry;
/**
 * Per-identity root: private index, public tree,
 *  share counter and published shares.
 */
pub mod root;
/**
 * Granting other identities access to
 *  private nodes.
 */
pub mod share;
/**
 * Storage layer implementation.
 *  A light wrapper around iroh-blobs for content,
 *  and a key value store for local credentials.
 */
pub mod store;
/**
 * Capability tokens: signed, expiring,
 *  delegable grants of authority.
 */
pub mod ucan;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::auth::{LinkingData, LinkingError, Lobby};
    pub use crate::crypto::{PublicKey, Secret, SecretKey};
    pub use crate::fs::{FsError, PrivateFs};
    pub use crate::linked_data::{multibase, Cid, CidError, Link};
    pub use crate::root::{MemoryResolver, RootTree};
    pub use crate::share::{ShareOptions, ShareWith, SharedBy, SharingEngine};
    pub use crate::store::{BlobsStore, FileKeyValueStore, KeyValueStore};
    pub use crate::ucan::{Potency, Ucan};
    pub use crate::version::build_info;
}
