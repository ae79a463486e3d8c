//! File storage backend.
//!
//! Layout under the site data directory:
//!
//! ```text
//! <root>/global.json
//! <root>/entities/<id>.json
//! <root>/external/<name>.json
//! ```
//!
//! Each file holds one JSON object mapping option keys to values. A batch is
//! staged into temporary files next to their targets and only renamed into
//! place once every file of the batch has been written. If a rename fails,
//! the files already renamed are put back to their previous contents.

use crate::models::Value;
use crate::storage::backend::{Namespace, StorageBackend, WriteBatch};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Backend storing one JSON document per namespace.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Create a backend rooted at `root` (created lazily on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing a namespace.
    pub fn namespace_path(&self, namespace: &Namespace) -> Result<PathBuf> {
        Ok(match namespace {
            Namespace::Global => self.root.join("global.json"),
            Namespace::Entity(id) => self.root.join("entities").join(format!("{}.json", id)),
            Namespace::External(name) => {
                validate_store_name(name)?;
                self.root.join("external").join(format!("{}.json", name))
            }
        })
    }

    fn read_raw(path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(path)
            .map(Some)
            .map_err(|e| unavailable(path, e))
    }

    fn parse(path: &Path, content: Option<&str>) -> Result<BTreeMap<String, Value>> {
        let Some(content) = content.filter(|c| !c.trim().is_empty()) else {
            return Ok(BTreeMap::new());
        };
        serde_json::from_str(content).map_err(|e| {
            Error::StorageUnavailable(format!("corrupt store {}: {}", path.display(), e))
        })
    }

    fn read_file(path: &Path) -> Result<BTreeMap<String, Value>> {
        let content = Self::read_raw(path)?;
        Self::parse(path, content.as_deref())
    }

    fn stage_text(path: &Path, text: &str) -> Result<NamedTempFile> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::StorageUnavailable(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(dir).map_err(|e| unavailable(dir, e))?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| unavailable(dir, e))?;
        tmp.write_all(text.as_bytes())
            .and_then(|_| tmp.flush())
            .map_err(|e| unavailable(path, e))?;
        Ok(tmp)
    }

    fn stage(path: &Path, values: &BTreeMap<String, Value>) -> Result<NamedTempFile> {
        let json = serde_json::to_string_pretty(values)?;
        Self::stage_text(path, &json)
    }
}

/// A staged file waiting to be renamed over its target.
struct Pending<'a> {
    tmp: NamedTempFile,
    path: &'a Path,
    previous: Option<String>,
}

/// Rename every staged file into place, restoring the already renamed
/// targets when one rename fails.
fn commit(pending: Vec<Pending<'_>>) -> Result<()> {
    let mut done: Vec<(&Path, Option<String>)> = Vec::with_capacity(pending.len());
    for Pending {
        tmp,
        path,
        previous,
    } in pending
    {
        match tmp.persist(path) {
            Ok(_) => done.push((path, previous)),
            Err(e) => {
                let err = unavailable(path, e.error);
                rollback(&done);
                return Err(err);
            }
        }
    }
    Ok(())
}

fn rollback(done: &[(&Path, Option<String>)]) {
    for (path, previous) in done.iter().rev() {
        let restored = match previous {
            Some(text) => FileBackend::stage_text(path, text).and_then(|tmp| {
                tmp.persist(path)
                    .map(|_| ())
                    .map_err(|e| unavailable(path, e.error))
            }),
            None => fs::remove_file(path).map_err(|e| unavailable(path, e)),
        };
        if let Err(e) = restored {
            tracing::error!(path = %path.display(), error = %e, "failed to roll back store file");
        }
    }
}

fn unavailable(path: &Path, err: std::io::Error) -> Error {
    Error::StorageUnavailable(format!("{}: {}", path.display(), err))
}

/// External store names become file names, so keep them tame.
fn validate_store_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "invalid external store name '{}'",
            name
        )))
    }
}

impl StorageBackend for FileBackend {
    fn load(&self, namespace: &Namespace) -> Result<BTreeMap<String, Value>> {
        Self::read_file(&self.namespace_path(namespace)?)
    }

    fn apply(&mut self, batch: WriteBatch) -> Result<()> {
        let mut staged: Vec<(PathBuf, BTreeMap<String, Value>, Option<String>)> = Vec::new();
        for namespace in batch.namespaces() {
            let path = self.namespace_path(namespace)?;
            let previous = Self::read_raw(&path)?;
            let mut values = Self::parse(&path, previous.as_deref())?;
            for op in batch.ops().iter().filter(|op| op.namespace() == namespace) {
                op.apply_to(&mut values);
            }
            staged.push((path, values, previous));
        }

        let mut pending = Vec::with_capacity(staged.len());
        for (path, values, previous) in &staged {
            pending.push(Pending {
                tmp: Self::stage(path, values)?,
                path,
                previous: previous.clone(),
            });
        }

        commit(pending)?;
        tracing::debug!(root = %self.root.display(), files = staged.len(), "committed batch");
        Ok(())
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}
