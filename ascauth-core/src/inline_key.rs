//! Materialization of inline key material.
//!
//! When the private key arrives as PEM text or base64 through the
//! environment, it is written once to an owner-only temporary file and the
//! path is handed out like any other key path. Files are cached per content
//! digest for the life of the process and deleted when
//! [`InlineKeyCache::cleanup`] runs, which the binary guarantees through
//! [`CleanupGuard`].

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::LazyLock;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tempfile::TempPath;
use zeroize::Zeroizing;

use crate::env;
use crate::key::KeyError;

static PROCESS_CACHE: LazyLock<InlineKeyCache> = LazyLock::new(InlineKeyCache::new);

/// The cache shared by the whole process.
pub fn process_cache() -> &'static InlineKeyCache {
    &PROCESS_CACHE
}

/// Temporary key files keyed by the SHA-256 of their contents.
#[derive(Default)]
pub struct InlineKeyCache {
    files: Mutex<HashMap<[u8; 32], TempPath>>,
}

impl InlineKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `pem` to an owner-only temporary file, or return the file
    /// already written for the same contents.
    pub fn materialize(&self, pem: &[u8]) -> Result<PathBuf, KeyError> {
        let digest: [u8; 32] = Sha256::digest(pem).into();

        let mut files = self.files.lock();
        if let Some(existing) = files.get(&digest) {
            return Ok(existing.to_path_buf());
        }

        // tempfile creates the file 0600 on Unix.
        let mut file = tempfile::Builder::new()
            .prefix("asc-key-")
            .suffix(".p8")
            .tempfile()
            .map_err(KeyError::TempFile)?;
        file.write_all(pem)
            .and_then(|()| file.flush())
            .map_err(KeyError::TempFile)?;

        let temp_path = file.into_temp_path();
        let path = temp_path.to_path_buf();
        tracing::debug!(path = %path.display(), "materialized inline private key");
        files.insert(digest, temp_path);
        Ok(path)
    }

    /// Number of live temporary files.
    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every temporary file. Safe to call more than once.
    pub fn cleanup(&self) {
        let files: Vec<TempPath> = self.files.lock().drain().map(|(_, path)| path).collect();
        for temp_path in files {
            let path = temp_path.to_path_buf();
            if let Err(e) = temp_path.close() {
                tracing::warn!(path = %path.display(), "failed to remove temporary key file: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for InlineKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InlineKeyCache")
            .field("files", &self.len())
            .finish()
    }
}

/// Clears the process cache when dropped.
///
/// Hold one for the whole run of the binary; it fires on normal return,
/// on error return and when a cancelled future unwinds main.
#[derive(Debug, Default)]
#[must_use = "temporary key files are removed when the guard is dropped"]
pub struct CleanupGuard(());

impl CleanupGuard {
    pub fn new() -> Self {
        Self(())
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        process_cache().cleanup();
    }
}

/// Inline key material as read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineEncoding {
    /// PEM text. Literal `\n` sequences are turned into newlines.
    Pem,

    /// Base64 of the PEM bytes. Whitespace is ignored.
    Base64,
}

/// Decode inline material into PEM bytes. Nothing touches the filesystem,
/// so malformed base64 fails before any file exists.
pub fn decode_inline(
    value: &str,
    encoding: InlineEncoding,
) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    match encoding {
        InlineEncoding::Pem => Ok(Zeroizing::new(
            value.replace("\\n", "\n").into_bytes(),
        )),
        InlineEncoding::Base64 => {
            let compact: Zeroizing<String> =
                Zeroizing::new(value.chars().filter(|c| !c.is_whitespace()).collect());
            BASE64
                .decode(compact.as_bytes())
                .map(Zeroizing::new)
                .map_err(|e| KeyError::InlineDecode {
                    var: env::PRIVATE_KEY_B64,
                    message: e.to_string(),
                })
        }
    }
}
