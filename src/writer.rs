//! Sinks for images extracted during composition.

use crate::error::LayoutError;
use std::path::{Path, PathBuf};

/// Persists extracted images under a name relative to some root.
pub trait ImageWriter: Send + Sync {
    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), LayoutError>;
}

/// Writes images as files inside one directory.
#[derive(Debug, Clone)]
pub struct FileImageWriter {
    root: PathBuf,
}

impl FileImageWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ImageWriter for FileImageWriter {
    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), LayoutError> {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LayoutError::ImageWriteFailed {
                path: path.clone(),
                source,
            })?;
        }
        std::fs::write(&path, bytes).map_err(|source| LayoutError::ImageWriteFailed { path, source })
    }
}
