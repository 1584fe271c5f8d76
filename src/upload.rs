//! Upload validation and per-request scratch storage.
//!
//! The reader takes a file-system path, so every accepted upload is written
//! into a [`ScopedWorkspace`]: a fresh `TempDir` under the configured root
//! that is deleted when the workspace is dropped, whether the request
//! succeeded, failed, or panicked. Validation runs first and touches nothing
//! on disk, so a rejected upload never allocates a workspace.

use crate::config::ParseMethod;
use crate::error::LayoutError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Extensions (lower-case, with the leading dot) the service accepts.
pub const ALLOWED_EXTENSIONS: [&str; 4] = [".pdf", ".png", ".jpeg", ".jpg"];

/// Prefix of every per-request directory.
pub const WORKSPACE_PREFIX: &str = "layout-";

/// Final dot-suffix of `filename`, lower-cased, with its leading dot.
///
/// Returns an empty string when there is no suffix. A dot-file such as
/// `.pdf` has no suffix either.
pub fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// `filename` without directories and without its final suffix.
pub fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document")
        .to_string()
}

/// Render the allow-list the way error messages show it.
pub fn allowed_extensions_display() -> String {
    format!("[{}]", ALLOWED_EXTENSIONS.join(", "))
}

/// Check `filename` against [`ALLOWED_EXTENSIONS`], returning the extension.
pub fn validate_extension(filename: &str) -> Result<String, LayoutError> {
    let extension = file_extension(filename);
    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(LayoutError::UnsupportedType {
            extension,
            allowed: allowed_extensions_display(),
        })
    }
}

/// Temporary directory owned by a single request.
#[derive(Debug)]
pub struct ScopedWorkspace {
    dir: TempDir,
}

impl ScopedWorkspace {
    /// Create a uniquely named directory under `root` (or the system temp dir).
    pub fn create(root: Option<&Path>) -> Result<Self, LayoutError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|source| LayoutError::TempStorage {
            path: root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source,
        })?;
        debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the upload under its base name and return the full path.
    ///
    /// Directory components in the client-supplied name are dropped, so the
    /// file always lands directly inside the workspace.
    pub async fn persist_upload(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, LayoutError> {
        let base = Path::new(filename)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("upload"));
        let path = self.dir.path().join(base);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| LayoutError::TempStorage {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Delete the directory now, reporting any error.
    ///
    /// Dropping the workspace does the same silently.
    pub fn close(self) -> Result<(), LayoutError> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| LayoutError::TempStorage { path, source })
    }
}

/// Create the output layout for one document:
/// `<output_dir>/<stem>/<method>/images` and `<output_dir>/<stem>/<method>`.
///
/// Returns `(image_dir, md_dir)`.
pub fn prepare_env(
    output_dir: &Path,
    stem: &str,
    parse_method: ParseMethod,
) -> Result<(PathBuf, PathBuf), LayoutError> {
    let md_dir = output_dir.join(stem).join(parse_method.as_str());
    let image_dir = md_dir.join("images");
    std::fs::create_dir_all(&image_dir).map_err(|source| LayoutError::TempStorage {
        path: image_dir.clone(),
        source,
    })?;
    Ok((image_dir, md_dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_case_insensitive_final_suffix() {
        assert_eq!(file_extension("Report.PDF"), ".pdf");
        assert_eq!(file_extension("scan.final.JpEg"), ".jpeg");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("README"), "");
        assert_eq!(file_extension(".pdf"), "");
    }

    #[test]
    fn validate_accepts_allow_list_only() {
        for ok in ["a.pdf", "b.PNG", "c.jpeg", "d.JPG"] {
            assert!(validate_extension(ok).is_ok(), "{ok} should be accepted");
        }
        for bad in ["a.docx", "b.gif", "noext", "c.pdf.exe", ".pdf"] {
            let err = validate_extension(bad).unwrap_err();
            assert!(err.is_client_error(), "{bad} should be rejected");
        }
    }

    #[test]
    fn rejection_message_lists_allowed_set() {
        let msg = validate_extension("slides.pptx").unwrap_err().to_string();
        assert!(msg.contains("'.pptx'"), "got: {msg}");
        assert!(msg.contains("[.pdf, .png, .jpeg, .jpg]"), "got: {msg}");
    }

    #[test]
    fn stem_strips_directories_and_suffix() {
        assert_eq!(file_stem("dir/sub/paper.v2.pdf"), "paper.v2");
        assert_eq!(file_stem(""), "document");
    }

    #[tokio::test]
    async fn workspace_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let ws = ScopedWorkspace::create(Some(root.path())).unwrap();
            let file = ws.persist_upload("doc.pdf", b"%PDF-1.7").await.unwrap();
            assert!(file.exists());
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn upload_name_cannot_escape_workspace() {
        let root = tempfile::tempdir().unwrap();
        let ws = ScopedWorkspace::create(Some(root.path())).unwrap();
        let file = ws.persist_upload("../../etc/evil.pdf", b"x").await.unwrap();
        assert_eq!(file.parent(), Some(ws.path()));
        ws.close().unwrap();
    }

    #[test]
    fn workspaces_do_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let a = ScopedWorkspace::create(Some(root.path())).unwrap();
        let b = ScopedWorkspace::create(Some(root.path())).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn prepare_env_builds_method_scoped_dirs() {
        let root = tempfile::tempdir().unwrap();
        let (images, md) = prepare_env(root.path(), "paper", ParseMethod::Ocr).unwrap();
        assert!(images.is_dir());
        assert_eq!(md, root.path().join("paper").join("ocr"));
        assert_eq!(images.file_name().unwrap(), "images");
    }
}
