//! Selective disclosure of private nodes to other identities.

pub mod engine;
pub mod entry_index;
pub mod key;
pub mod payload;

pub use engine::{ShareDetails, ShareError, ShareOptions, ShareWith, SharedBy, SharingEngine};
pub use entry_index::EntryIndex;
pub use key::ShareKey;
pub use payload::SharePayload;
