//! Cryptographic primitives for Veil
//!
//! - **Identity**: Ed25519 keypairs, addressed as `did:key` identifiers. The
//!   same key acts as the exchange key other users seal share payloads to.
//! - **Content encryption**: ChaCha20-Poly1305 `Secret`s, one per private node.
//! - **Key handover**: `SecretShare` (ECDH + AES-KW) wraps a single key for a
//!   recipient; `sealed` encrypts whole payloads to a recipient.

pub mod did;
mod keys;
pub mod sealed;
mod secret;
mod secret_share;

pub use ed25519_dalek::Signature;
pub use keys::{KeyError, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use sealed::SealError;
pub use secret::{Secret, SecretError, SymmAlg, BLAKE3_HASH_SIZE, NONCE_SIZE, SECRET_SIZE};
pub use secret_share::{SecretShare, SecretShareError};
