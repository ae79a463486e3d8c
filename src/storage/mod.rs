//! Storage layer for optlayer data.
//!
//! Every site gets its own data directory:
//! `~/.local/share/optlayer/<site-hash>/` (root overridable with
//! `OPTLAYER_DATA_DIR`), where `<site-hash>` is the first 12 hex characters of
//! the SHA-256 of the canonical site path.
//!
//! The directory holds:
//! - `options/` - option values, managed by a [`StorageBackend`]
//! - `config.kdl` - session preferences
//! - `state.kdl` - session secrets (0600 on unix)
//! - `action.log` - JSONL command log
//!
//! System-wide preferences live in `~/.config/optlayer/config.kdl`
//! (directory overridable with `OPTLAYER_CONFIG_DIR`).

pub mod backend;
pub mod file;
pub mod memory;

pub use backend::{BackendType, Namespace, StorageBackend, WriteBatch, WriteOp};
pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::config::{OptlayerConfig, OptlayerState};
use crate::{Error, Result};
use kdl::KdlDocument;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "OPTLAYER_DATA_DIR";

/// Environment variable overriding the system config directory.
pub const CONFIG_DIR_ENV: &str = "OPTLAYER_CONFIG_DIR";

/// Storage manager for a single site.
#[derive(Debug, Clone)]
pub struct Storage {
    /// Root directory for this site's data
    pub root: PathBuf,
}

impl Storage {
    /// Open storage for the given site using the default data root.
    pub fn open(site_path: &Path) -> Result<Self> {
        Self::open_with_data_dir(site_path, &data_root()?)
    }

    /// Open storage for the given site under an explicit data root.
    pub fn open_with_data_dir(site_path: &Path, data_dir: &Path) -> Result<Self> {
        let root = get_storage_dir_with_data_dir(site_path, data_dir)?;
        if !root.exists() {
            return Err(Error::NotInitialized);
        }
        Ok(Self { root })
    }

    /// Initialize storage for a site using the default data root.
    pub fn init(site_path: &Path) -> Result<Self> {
        Self::init_with_data_dir(site_path, &data_root()?)
    }

    /// Initialize storage for a site under an explicit data root.
    ///
    /// Idempotent: existing data is left untouched.
    pub fn init_with_data_dir(site_path: &Path, data_dir: &Path) -> Result<Self> {
        let root = get_storage_dir_with_data_dir(site_path, data_dir)?;
        fs::create_dir_all(root.join("options"))?;
        let site_file = root.join("site");
        if !site_file.exists() {
            let canonical = site_path.canonicalize()?;
            fs::write(&site_file, canonical.to_string_lossy().as_bytes())?;
        }
        Ok(Self { root })
    }

    /// Check whether storage exists for the site under an explicit data root.
    pub fn exists_with_data_dir(site_path: &Path, data_dir: &Path) -> Result<bool> {
        Ok(get_storage_dir_with_data_dir(site_path, data_dir)?.exists())
    }

    /// Create the option backend of the requested type.
    pub fn backend(&self, backend_type: BackendType) -> Box<dyn StorageBackend> {
        match backend_type {
            BackendType::File => Box::new(FileBackend::new(self.root.join("options"))),
            BackendType::Memory => Box::new(MemoryBackend::new()),
        }
    }

    /// Path of the action log.
    pub fn action_log_path(&self) -> PathBuf {
        self.root.join("action.log")
    }

    // ==================== Session config.kdl / state.kdl ====================

    pub fn config_kdl_path(&self) -> PathBuf {
        self.root.join("config.kdl")
    }

    pub fn state_kdl_path(&self) -> PathBuf {
        self.root.join("state.kdl")
    }

    /// Read the session config.kdl document (empty if missing).
    pub fn read_config_kdl(&self) -> Result<KdlDocument> {
        read_kdl(&self.config_kdl_path())
    }

    /// Read session preferences.
    pub fn read_optlayer_config(&self) -> Result<OptlayerConfig> {
        Ok(OptlayerConfig::from_kdl(&self.read_config_kdl()?))
    }

    /// Write session preferences.
    pub fn write_optlayer_config(&self, config: &OptlayerConfig) -> Result<()> {
        config.validate().map_err(Error::InvalidInput)?;
        write_kdl(&self.config_kdl_path(), &config.to_kdl(), None)
    }

    /// Read session state.
    pub fn read_optlayer_state(&self) -> Result<OptlayerState> {
        Ok(OptlayerState::from_kdl(&read_kdl(&self.state_kdl_path())?))
    }

    /// Write session state with owner-only permissions.
    pub fn write_optlayer_state(&self, state: &OptlayerState) -> Result<()> {
        #[cfg(unix)]
        let mode = Some(crate::config::STATE_FILE_MODE);
        #[cfg(not(unix))]
        let mode = None;
        write_kdl(&self.state_kdl_path(), &state.to_kdl(), mode)
    }

    // ==================== System config.kdl ====================

    /// System config directory (`OPTLAYER_CONFIG_DIR` or `~/.config/optlayer`).
    pub fn system_config_dir() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Some(PathBuf::from(dir));
        }
        dirs::config_dir().map(|d| d.join("optlayer"))
    }

    pub fn system_config_kdl_path() -> Option<PathBuf> {
        Self::system_config_dir().map(|d| d.join("config.kdl"))
    }

    /// Read system preferences (empty if missing or undeterminable).
    pub fn read_system_optlayer_config() -> Result<OptlayerConfig> {
        match Self::system_config_kdl_path() {
            Some(path) => Ok(OptlayerConfig::from_kdl(&read_kdl(&path)?)),
            None => Ok(OptlayerConfig::default()),
        }
    }

    /// Write system preferences.
    pub fn write_system_optlayer_config(config: &OptlayerConfig) -> Result<()> {
        config.validate().map_err(Error::InvalidInput)?;
        let path = Self::system_config_kdl_path()
            .ok_or_else(|| Error::Other("Could not determine config directory".to_string()))?;
        write_kdl(&path, &config.to_kdl(), None)
    }
}

/// Data root (`OPTLAYER_DATA_DIR` or `<data dir>/optlayer`).
pub fn data_root() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|d| d.join("optlayer"))
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))
}

/// Short hash identifying a site by its canonical path.
pub fn site_hash(site_path: &Path) -> Result<String> {
    let canonical = site_path
        .canonicalize()
        .map_err(|e| Error::Other(format!("Could not canonicalize site path: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let hash_hex = format!("{:x}", hasher.finalize());
    Ok(hash_hex[..12].to_string())
}

/// Storage directory of a site under an explicit data root.
pub fn get_storage_dir_with_data_dir(site_path: &Path, data_dir: &Path) -> Result<PathBuf> {
    Ok(data_dir.join(site_hash(site_path)?))
}

fn read_kdl(path: &Path) -> Result<KdlDocument> {
    if !path.exists() {
        return Ok(KdlDocument::new());
    }
    let content = fs::read_to_string(path)?;
    content
        .parse()
        .map_err(|e| Error::Other(format!("Failed to parse KDL in {}: {}", path.display(), e)))
}

fn write_kdl(path: &Path, doc: &KdlDocument, mode: Option<u32>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, doc.to_string())?;
    if let Some(mode) = mode {
        set_file_mode(path, mode)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_file_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
