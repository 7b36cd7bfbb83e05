//! Filesystem-backed adapters for Pantry: document store, identity provider,
//! blob store, and configuration.

use std::fs;
use std::path::{Path, PathBuf};

use pt_core::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

mod blob;
mod config;
mod identity;
mod store;

pub use blob::FsBlobStore;
pub use config::{
    load_config, resolve_pantry_path, save_config, set_config_path, PantryConfig, RecipesConfig,
};
pub use identity::FsIdentity;
pub use store::FsStore;

/// Default directory name for the data root.
pub const PANTRY_DIR_NAME: &str = "pantry";

/// Root of a pantry data directory.
#[derive(Debug, Clone)]
pub struct FsPantry {
    root: PathBuf,
}

impl FsPantry {
    /// Create a handle rooted at the provided path.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the root path.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve the default data path (~/.pantry).
    pub fn default_path() -> CoreResult<PathBuf> {
        if let Some(dir) = dirs::home_dir() {
            return Ok(dir.join(format!(".{PANTRY_DIR_NAME}")));
        }
        Err(CoreError::StoreUnavailable(
            "unable to determine a default pantry path".into(),
        ))
    }

    /// Check if the data directory has been initialized.
    pub fn exists(&self) -> bool {
        self.root.exists() && self.users_root().exists() && self.state_root().exists()
    }

    /// Create the directory layout.
    pub fn init(&self) -> CoreResult<()> {
        if self.exists() {
            return Ok(());
        }
        for dir in [self.users_root(), self.state_root(), self.blobs_root()] {
            fs::create_dir_all(dir).map_err(|err| CoreError::StoreUnavailable(err.to_string()))?;
        }
        Ok(())
    }

    /// Document store over `users/`.
    pub fn store(&self) -> FsStore {
        FsStore::new(self.users_root())
    }

    /// Identity provider over `.state/`, resuming any persisted sign-in.
    pub fn identity(&self) -> CoreResult<FsIdentity> {
        FsIdentity::open(self.state_root())
    }

    /// Blob store over `blobs/`.
    pub fn blobs(&self) -> FsBlobStore {
        FsBlobStore::new(self.blobs_root())
    }

    fn users_root(&self) -> PathBuf {
        self.root.join("users")
    }

    fn state_root(&self) -> PathBuf {
        self.root.join(".state")
    }

    fn blobs_root(&self) -> PathBuf {
        self.root.join("blobs")
    }
}

pub(crate) async fn run_blocking<T, F>(task: F) -> CoreResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| CoreError::StoreUnavailable(err.to_string()))?
}

pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> CoreResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).map_err(|err| CoreError::StoreUnavailable(err.to_string()))?;
    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|err| CoreError::StoreUnavailable(err.to_string()))
}

pub(crate) fn write_yaml<T: Serialize + ?Sized>(path: &Path, value: &T) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| CoreError::StoreUnavailable(err.to_string()))?;
    }
    let contents =
        serde_yaml::to_string(value).map_err(|err| CoreError::StoreUnavailable(err.to_string()))?;
    fs::write(path, contents).map_err(|err| CoreError::StoreUnavailable(err.to_string()))
}
