//! Editing surface the seek loop reads from and installs candidates into.
//!
//! The engine treats the surface as an opaque text buffer. [`FileSurface`]
//! backs it with a file on disk; [`MemorySurface`] keeps it in memory for
//! tests and embedding.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::{Result, SeekError};

/// Abstraction over the text buffer being fixed.
///
/// # Example
///
/// ```rust
/// use seekloop::surface::{EditingSurface, MemorySurface};
///
/// let surface = MemorySurface::new("let x = 1");
/// surface.replace_all_text("let x = 2").unwrap();
/// assert_eq!(surface.current_text().unwrap(), "let x = 2");
/// ```
pub trait EditingSurface: Send + Sync {
    /// Read the whole buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::Surface`] if the buffer cannot be read.
    fn current_text(&self) -> Result<String>;

    /// Replace the whole buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::Surface`] if the buffer cannot be written.
    fn replace_all_text(&self, text: &str) -> Result<()>;
}

/// A single file on disk.
#[derive(Debug, Clone)]
pub struct FileSurface {
    path: PathBuf,
}

impl FileSurface {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".seekloop.tmp");
        self.path.with_file_name(name)
    }
}

impl EditingSurface for FileSurface {
    fn current_text(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            SeekError::surface(format!("failed to read {}: {}", self.path.display(), e))
        })
    }

    fn replace_all_text(&self, text: &str) -> Result<()> {
        let tmp = self.tmp_path();
        std::fs::write(&tmp, text)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                SeekError::surface(format!("failed to write {}: {}", self.path.display(), e))
            })?;
        debug!("Installed {} bytes into {}", text.len(), self.path.display());
        Ok(())
    }
}

/// In-memory buffer that remembers every write.
#[derive(Debug, Default)]
pub struct MemorySurface {
    text: Mutex<String>,
    writes: Mutex<Vec<String>>,
}

impl MemorySurface {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Every text installed via [`EditingSurface::replace_all_text`], in order.
    #[must_use]
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl EditingSurface for MemorySurface {
    fn current_text(&self) -> Result<String> {
        self.text
            .lock()
            .map(|t| t.clone())
            .map_err(|_| SeekError::surface("memory surface lock poisoned"))
    }

    fn replace_all_text(&self, text: &str) -> Result<()> {
        let mut current = self
            .text
            .lock()
            .map_err(|_| SeekError::surface("memory surface lock poisoned"))?;
        *current = text.to_string();
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(text.to_string());
        }
        Ok(())
    }
}
