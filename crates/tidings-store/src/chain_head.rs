use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, StoreError};

/// Persists the most recent envelope hash so a restarted notifier can keep
/// chaining instead of starting over from genesis.
pub struct ChainHeadFile {
    path: PathBuf,
}

impl ChainHeadFile {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored head, or `None` if nothing has been written yet.
    pub fn load(&self) -> Result<Option<String>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let head = text.trim();
        if !head.starts_with("json:") || head.contains(char::is_whitespace) {
            warn!(path = %self.path.display(), "Chain head file holds no digest");
            return Err(StoreError::InvalidChainHead(head.to_string()));
        }
        Ok(Some(head.to_string()))
    }

    /// Replace the stored head (temp file + rename).
    pub fn store(&self, head: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(head.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
