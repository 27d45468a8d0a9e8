pub mod bare;
pub mod resolver;
pub mod tree;

pub use bare::{BareNode, BareTree};
pub use resolver::{DataRootResolver, DidResolver, MemoryResolver, ResolverError};
pub use tree::{exchange_dids, RootHeader, RootTree, RootTreeError, ShareRecord, EXCHANGE_PATH};
