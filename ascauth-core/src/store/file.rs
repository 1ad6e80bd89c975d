//! Owner-only JSON config file backend.
//!
//! Config files live at `~/.asc/config.json` (global) and
//! `./.asc/config.json` (local). New files are created `0600` and new
//! directories `0700`. Writing an existing file never touches its mode, so
//! a file someone made group-readable stays that way until `doctor --fix`
//! is explicitly asked to narrow it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::model::{ConfigDocument, CredentialSource};

use super::{CredentialStore, StoreError};

/// Mode for files written by this crate.
pub const PRIVATE_FILE_MODE: u32 = 0o600;

/// Mode for directories created by this crate.
#[cfg(unix)]
const PRIVATE_DIR_MODE: u32 = 0o700;

/// Whether a Unix mode grants any group or world permission bits.
pub fn mode_is_too_open(mode: u32) -> bool {
    mode & 0o077 != 0
}

/// Permission bits of `path`, or `None` on platforms without Unix modes.
#[cfg(unix)]
pub fn file_mode(path: &Path) -> std::io::Result<Option<u32>> {
    use std::os::unix::fs::PermissionsExt;

    Ok(Some(fs::metadata(path)?.permissions().mode() & 0o777))
}

#[cfg(not(unix))]
pub fn file_mode(path: &Path) -> std::io::Result<Option<u32>> {
    fs::metadata(path).map(|_| None)
}

/// Narrow a file's mode to owner read/write.
///
/// Returns `Ok(true)` when the mode changed, `Ok(false)` when it was
/// already restricted. Contents are never touched.
#[cfg(unix)]
pub fn restrict_permissions(path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)?.permissions().mode() & 0o777;
    if !mode_is_too_open(mode) {
        return Ok(false);
    }
    fs::set_permissions(path, fs::Permissions::from_mode(PRIVATE_FILE_MODE))?;
    tracing::info!(path = %path.display(), from = %format!("{:o}", mode), "restricted file permissions");
    Ok(true)
}

#[cfg(not(unix))]
pub fn restrict_permissions(_path: &Path) -> std::io::Result<bool> {
    Ok(false)
}

/// Disk-backed credential store.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Create a store backed by the given file path. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The config file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the config file exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Scaffold an empty document.
    ///
    /// Refuses to overwrite an existing file unless `force` is set.
    pub fn init(&self, force: bool) -> Result<(), StoreError> {
        if self.path.exists() && !force {
            return Err(StoreError::Conflict {
                message: format!(
                    "{} already exists (use --force to overwrite)",
                    self.path.display()
                ),
            });
        }
        self.save(&ConfigDocument::default())
    }

    fn create_parent(&self) -> Result<(), StoreError> {
        let Some(parent) = self.path.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() || parent.exists() {
            return Ok(());
        }

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(PRIVATE_DIR_MODE);
        }
        builder
            .create(parent)
            .map_err(|e| StoreError::io(parent, e))
    }
}

impl CredentialStore for FileCredentialStore {
    fn source(&self) -> CredentialSource {
        CredentialSource::Config
    }

    fn source_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<ConfigDocument, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ConfigDocument::default());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if contents.trim().is_empty() {
            return Ok(ConfigDocument::default());
        }

        serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
            location: self.location(),
            source,
        })
    }

    fn save(&self, doc: &ConfigDocument) -> Result<(), StoreError> {
        self.create_parent()?;

        let mut contents = serde_json::to_string_pretty(doc)?;
        contents.push('\n');

        // Readers only ever see the old or the new document: write a sibling
        // temp file and rename it over the config path.
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;

        // New temp files are owner-only; an existing config keeps its mode.
        match fs::metadata(&self.path) {
            Ok(existing) => fs::set_permissions(file.path(), existing.permissions())
                .map_err(|e| StoreError::io(&self.path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&self.path, e)),
        }

        file.write_all(contents.as_bytes())
            .and_then(|()| file.as_file().sync_all())
            .map_err(|e| StoreError::io(&self.path, e))?;
        file.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;
        Ok(())
    }
}
