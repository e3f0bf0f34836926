//! Media library: source resolution and file listing.
//!
//! Callers refer to local media by file name relative to the media directory;
//! network sources are passed through to the renderer untouched.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::protocol_constants::MEDIA_EXTENSIONS;
use crate::utils::{is_network_source, system_time_millis};

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media file not found: {0}")]
    NotFound(String),

    #[error("invalid media name: {0}")]
    InvalidName(String),

    #[error("media directory unreadable: {0}")]
    Io(#[from] std::io::Error),
}

/// A playable file in the media directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time in Unix milliseconds.
    pub modified: u64,
}

/// Resolves and lists media under one directory.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
}

impl MediaLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Turns a caller-supplied source into the argument handed to the renderer.
    ///
    /// URLs are returned unchanged. File names must stay inside the media
    /// directory and exist.
    pub async fn resolve(&self, source: &str) -> Result<String, MediaError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(MediaError::InvalidName("source must not be empty".into()));
        }
        if is_network_source(source) {
            return Ok(source.to_string());
        }

        let relative = Path::new(source);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(MediaError::InvalidName(source.to_string()));
        }

        let path = self.root.join(relative);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path.to_string_lossy().into_owned()),
            Ok(_) => Err(MediaError::NotFound(source.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MediaError::NotFound(source.to_string()))
            }
            Err(e) => Err(MediaError::Io(e)),
        }
    }

    /// Lists playable files, sorted by name.
    ///
    /// A missing media directory yields an empty list.
    pub async fn list(&self) -> Result<Vec<MediaFile>, MediaError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("[Media] {} does not exist", self.root.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !has_media_extension(&path) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("[Media] Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            files.push(MediaFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                modified: meta.modified().map(system_time_millis).unwrap_or(0),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

fn has_media_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            MEDIA_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library_with(files: &[&str]) -> (tempfile::TempDir, MediaLibrary) {
        let dir = tempfile::tempdir().unwrap();
        for name in files {
            std::fs::write(dir.path().join(name), b"data").unwrap();
        }
        let library = MediaLibrary::new(dir.path());
        (dir, library)
    }

    #[tokio::test]
    async fn urls_pass_through_unchanged() {
        let (_dir, library) = library_with(&[]);
        let url = "rtsp://10.0.0.8:554/stream1";
        assert_eq!(library.resolve(url).await.unwrap(), url);
    }

    #[tokio::test]
    async fn file_names_resolve_inside_media_dir() {
        let (dir, library) = library_with(&["promo.mp4"]);
        let resolved = library.resolve("promo.mp4").await.unwrap();
        assert_eq!(PathBuf::from(resolved), dir.path().join("promo.mp4"));
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_dir, library) = library_with(&[]);
        assert!(matches!(
            library.resolve("nope.mp4").await,
            Err(MediaError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn traversal_and_absolute_paths_are_rejected() {
        let (_dir, library) = library_with(&[]);
        for bad in ["../etc/passwd", "/etc/passwd", "clips/../../x.mp4", "  "] {
            assert!(
                matches!(library.resolve(bad).await, Err(MediaError::InvalidName(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn list_filters_by_extension_and_sorts() {
        let (_dir, library) = library_with(&["b.MKV", "a.mp4", "notes.txt", "c.webm"]);
        let names: Vec<_> = library
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a.mp4", "b.MKV", "c.webm"]);
    }

    #[tokio::test]
    async fn missing_media_dir_lists_nothing() {
        let library = MediaLibrary::new("/nonexistent/vidzone/media");
        assert!(library.list().await.unwrap().is_empty());
    }
}
