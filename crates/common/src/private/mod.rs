//! The private tree: name-obfuscated, encrypted files and directories
//! addressed through a shared index of saturated name filters.

pub mod index;
pub mod metadata;
pub mod namefilter;
pub mod node;

pub use index::{PrivateIndex, PrivateIndexError};
pub use metadata::{MaybeMime, Metadata};
pub use namefilter::{add_to_filter, saturate, BareNameFilter, PrivateName};
pub use node::{
    ChildLink, PrivateDirectory, PrivateFile, PrivateLink, PrivateNode, PrivateNodeError,
    PrivateNodeHeader, SoftLink,
};
