use std::collections::BTreeMap;
use std::sync::Arc;
use std::{fs, path::PathBuf};

use common::auth::lobby::READ_KEY_STORAGE_KEY;
use common::auth::Lobby;
use common::crypto::{Secret, SecretError};
use common::fs::{FsError, PrivateFs};
use common::linked_data::CidError;
use common::prelude::{Link, SecretKey};
use common::root::{MemoryResolver, ResolverError};
use common::store::{
    BlobsStore, BlobsStoreError, FileKeyValueStore, KeyValueStore, KeyValueStoreError,
};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "veil";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_FILE_NAME: &str = "key.pem";
pub const BLOBS_DIR_NAME: &str = "blobs";
pub const STORAGE_FILE_NAME: &str = "storage.json";

/// Storage key holding the link to this device's latest root tree
pub const ROOT_STORAGE_KEY: &str = "veil__root";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default log level, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for log files (logs to stderr only if not set)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Account this device acts for
    #[serde(default)]
    pub username: Option<String>,
    /// Username -> published root DID
    #[serde(default)]
    pub identities: BTreeMap<String, String>,
    /// Username -> link to their published root tree
    #[serde(default)]
    pub data_roots: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: None,
            username: None,
            identities: BTreeMap::new(),
            data_roots: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Parsed log level, falling back to `warn` on garbage
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::WARN)
    }

    /// Resolver over the configured identities and data roots
    pub fn resolver(&self) -> Result<MemoryResolver, StateError> {
        let resolver = MemoryResolver::new();
        for (username, did) in &self.identities {
            resolver.set_root_did(username, did)?;
        }
        for (username, link) in &self.data_roots {
            resolver.set_data_root(username, link.parse::<Link>()?)?;
        }
        Ok(resolver)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the veil directory (~/.veil)
    pub veil_dir: PathBuf,
    /// Path to the device key PEM file
    pub key_path: PathBuf,
    /// Path to the blobs directory
    pub blobs_path: PathBuf,
    /// Path to the local credential storage
    pub storage_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the veil directory path (custom or default ~/.veil)
    pub fn veil_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new veil state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let veil_dir = Self::veil_dir(custom_path)?;

        if veil_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&veil_dir)?;

        let blobs_path = veil_dir.join(BLOBS_DIR_NAME);
        fs::create_dir_all(&blobs_path)?;

        // Generate and save the device key
        let key = SecretKey::generate();
        let key_path = veil_dir.join(KEY_FILE_NAME);
        fs::write(&key_path, key.to_pem())?;

        let storage_path = veil_dir.join(STORAGE_FILE_NAME);
        fs::write(&storage_path, "{}")?;

        let state = Self {
            config_path: veil_dir.join(CONFIG_FILE_NAME),
            veil_dir,
            key_path,
            blobs_path,
            storage_path,
            config: config.unwrap_or_default(),
        };
        state.save_config()?;
        Ok(state)
    }

    /// Load existing state from the veil directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let veil_dir = Self::veil_dir(custom_path)?;

        if !veil_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let key_path = veil_dir.join(KEY_FILE_NAME);
        let blobs_path = veil_dir.join(BLOBS_DIR_NAME);
        let storage_path = veil_dir.join(STORAGE_FILE_NAME);
        let config_path = veil_dir.join(CONFIG_FILE_NAME);

        if !key_path.exists() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }
        if !blobs_path.exists() {
            return Err(StateError::MissingFile(format!("{}/", BLOBS_DIR_NAME)));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            veil_dir,
            key_path,
            blobs_path,
            storage_path,
            config_path,
            config,
        })
    }

    pub fn save_config(&self) -> Result<(), StateError> {
        fs::write(&self.config_path, toml::to_string_pretty(&self.config)?)?;
        Ok(())
    }

    /// Load the secret key from the key file
    pub fn load_key(&self) -> Result<SecretKey, StateError> {
        let pem = fs::read_to_string(&self.key_path)?;
        let key = SecretKey::from_pem(&pem).map_err(|e| StateError::InvalidKey(e.to_string()))?;
        Ok(key)
    }

    pub async fn blobs(&self) -> Result<BlobsStore, StateError> {
        Ok(BlobsStore::fs(&self.blobs_path).await?)
    }

    pub async fn storage(&self) -> Result<Arc<FileKeyValueStore>, StateError> {
        Ok(Arc::new(FileKeyValueStore::open(&self.storage_path).await?))
    }

    /// The account this device acts for
    pub fn username(&self) -> Result<&str, StateError> {
        self.config.username.as_deref().ok_or(StateError::NoUsername)
    }

    pub async fn lobby(&self) -> Result<Lobby, StateError> {
        Ok(Lobby::new(
            self.storage().await?,
            self.load_key()?,
            Arc::new(self.config.resolver()?),
        ))
    }

    /// Open this device's filesystem from its stored root and read key
    pub async fn open_fs(&self) -> Result<(PrivateFs, BlobsStore), StateError> {
        let storage = self.storage().await?;
        // a freshly linked device only knows the account's published root
        let published = self
            .config
            .username
            .as_ref()
            .and_then(|username| self.config.data_roots.get(username))
            .cloned();
        let root = storage
            .get_item(ROOT_STORAGE_KEY)
            .await?
            .or(published)
            .ok_or(StateError::NoFilesystem)?;
        let read_key = storage
            .get_item(READ_KEY_STORAGE_KEY)
            .await?
            .ok_or(StateError::NoFilesystem)?;

        let blobs = self.blobs().await?;
        let fs = PrivateFs::load(
            &root.parse::<Link>()?,
            &Secret::from_hex(&read_key)?,
            &blobs,
            Arc::new(self.config.resolver()?),
        )
        .await?;
        Ok((fs, blobs))
    }

    /// Persist `fs`, remember its root locally and publish it under our
    /// username in the config
    pub async fn save_fs(&mut self, fs: &PrivateFs) -> Result<Link, StateError> {
        let link = fs.persist().await?;
        let read_key = fs.read_key().await;
        self.storage()
            .await?
            .set_items(vec![
                (ROOT_STORAGE_KEY.to_string(), link.to_string()),
                (READ_KEY_STORAGE_KEY.to_string(), read_key.to_hex()),
            ])
            .await?;

        if let Some(username) = self.config.username.clone() {
            self.config.data_roots.insert(username, link.to_string());
            self.save_config()?;
        }
        tracing::debug!("saved filesystem root {}", link);
        Ok(link)
    }

    /// Flush the blob store behind an opened filesystem
    pub async fn close_fs(&self, blobs: BlobsStore) -> Result<(), StateError> {
        blobs.shutdown().await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("veil directory not initialized. Run 'veil init' first")]
    NotInitialized,

    #[error("veil directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("no username configured")]
    NoUsername,

    #[error("this device has no filesystem yet. Run 'veil init' or 'veil link' first")]
    NoFilesystem,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("blobs store error: {0}")]
    Blobs(#[from] BlobsStoreError),

    #[error("storage error: {0}")]
    Storage(#[from] KeyValueStoreError),

    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("invalid link: {0}")]
    Link(#[from] CidError),

    #[error("invalid read key: {0}")]
    ReadKey(#[from] SecretError),

    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),
}
