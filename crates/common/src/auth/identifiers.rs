//! Storage keys for per-path credentials.

use sha2::{Digest, Sha256};

/// Collapse repeated and trailing separators so `/private/docs/` and
/// `private/docs` address the same entry
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn path_digest(path: &str) -> String {
    hex::encode(Sha256::digest(normalize_path(path).as_bytes()))
}

pub fn read_key(path: &str) -> String {
    format!("veil__readKey__{}", path_digest(path))
}

pub fn bare_name_filter(path: &str) -> String {
    format!("veil__bareNameFilter__{}", path_digest(path))
}
