use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mime::Mime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::version::{Version, LATEST};

/// An optional MIME type, stored as a plain string or null
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaybeMime(pub Option<Mime>);

impl MaybeMime {
    pub fn from_name(name: &str) -> Self {
        MaybeMime(mime_guess::from_path(Path::new(name)).first())
    }
}

impl Serialize for MaybeMime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            Some(mime) => serializer.serialize_str(mime.as_ref()),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for MaybeMime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => Mime::from_str(&s)
                .map(|m| MaybeMime(Some(m)))
                .map_err(serde::de::Error::custom),
            None => Ok(MaybeMime(None)),
        }
    }
}

/// Unencrypted-shape metadata carried inside every (encrypted) node header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub created: i64,
    pub modified: i64,
    pub is_file: bool,
    pub mime: MaybeMime,
    pub version: Version,
}

impl Metadata {
    pub fn new_file(name: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            created: now,
            modified: now,
            is_file: true,
            mime: MaybeMime::from_name(name),
            version: LATEST,
        }
    }

    pub fn new_directory() -> Self {
        let now = Utc::now().timestamp();
        Self {
            created: now,
            modified: now,
            is_file: false,
            mime: MaybeMime(None),
            version: LATEST,
        }
    }

    pub fn touch(&mut self) {
        self.modified = Utc::now().timestamp();
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.modified, 0)
    }
}
