//! Device linking, capability checks and credential import.

pub mod classified;
pub mod identifiers;
pub mod lobby;

pub use classified::{ClassifiedInfo, ClassifiedSecrets, FsSecret, SecretExchangeChannel};
pub use lobby::{LinkingData, LinkingError, Lobby};
