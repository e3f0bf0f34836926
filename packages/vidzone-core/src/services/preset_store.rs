//! Durable named geometry presets.
//!
//! The store keeps one JSON document in memory and mirrors every change to
//! disk with an atomic write (temp file + rename). A mutation is applied to a
//! copy first and only swapped in once the write succeeded, so a failed write
//! leaves the in-memory state exactly as it was.
//!
//! ```json
//! {
//!   "presets": {
//!     "corner-pip": {
//!       "geometry": {"x": 1280, "y": 720, "width": 640, "height": 360},
//!       "description": "Picture-in-picture (bottom right)"
//!     }
//!   },
//!   "default": "corner-pip"
//! }
//! ```
//!
//! Older documents that are a bare `name -> preset` map are still accepted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{EventEmitter, PresetEvent};
use crate::geometry::{Geometry, GeometryError};
use crate::protocol_constants::MAX_PRESET_NAME_LEN;
use crate::utils::now_millis;

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("preset '{0}' not found")]
    NotFound(String),

    #[error("invalid preset name: {0}")]
    InvalidName(String),

    #[error("invalid preset geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    #[error("failed to write presets: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode presets: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type PresetResult<T> = Result<T, PresetError>;

/// A named zone geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub name: String,
    pub geometry: Geometry,
    pub description: String,
}

/// All presets plus the default designation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetList {
    pub presets: Vec<Preset>,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredPreset {
    geometry: Geometry,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct PresetDocument {
    presets: BTreeMap<String, StoredPreset>,
    #[serde(default)]
    default: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk {
    Current(PresetDocument),
    Legacy(BTreeMap<String, StoredPreset>),
}

impl PresetDocument {
    fn builtin() -> Self {
        let presets = [
            ("fullscreen", "Full screen", Geometry::new(0, 0, 1920, 1080)),
            ("left-half", "Left half of screen", Geometry::new(0, 0, 960, 1080)),
            ("right-half", "Right half of screen", Geometry::new(960, 0, 960, 1080)),
            ("top-half", "Top half of screen", Geometry::new(0, 0, 1920, 540)),
            ("bottom-half", "Bottom half of screen", Geometry::new(0, 540, 1920, 540)),
            ("center-large", "Centered 80% size", Geometry::new(192, 108, 1536, 864)),
            (
                "corner-pip",
                "Picture-in-picture (bottom right)",
                Geometry::new(1280, 720, 640, 360),
            ),
        ]
        .into_iter()
        .map(|(name, description, geometry)| {
            (
                name.to_string(),
                StoredPreset {
                    geometry,
                    description: description.to_string(),
                },
            )
        })
        .collect();

        Self {
            presets,
            default: None,
        }
    }

    /// Drops a dangling default designation.
    fn normalize(mut self) -> Self {
        if let Some(name) = &self.default {
            if !self.presets.contains_key(name) {
                log::warn!("[Presets] Default '{}' does not exist, clearing it", name);
                self.default = None;
            }
        }
        self
    }
}

/// Thread-safe preset store backed by an optional JSON file.
pub struct PresetStore {
    path: Option<PathBuf>,
    doc: Mutex<PresetDocument>,
    emitter: Arc<dyn EventEmitter>,
}

impl PresetStore {
    /// Opens the store at `path`, or keeps presets in memory when `None`.
    ///
    /// A missing file is seeded with the built-in presets. An unreadable or
    /// corrupt file is moved aside to `<file>.corrupt` and seeded likewise.
    pub fn open(path: Option<PathBuf>, emitter: Arc<dyn EventEmitter>) -> Self {
        let doc = match &path {
            Some(path) => load_or_seed(path),
            None => PresetDocument::builtin(),
        };
        log::info!("[Presets] Loaded {} preset(s)", doc.presets.len());
        Self {
            path,
            doc: Mutex::new(doc),
            emitter,
        }
    }

    pub fn list(&self) -> PresetList {
        let doc = self.doc.lock();
        PresetList {
            presets: doc
                .presets
                .iter()
                .map(|(name, stored)| to_preset(name, stored))
                .collect(),
            default: doc.default.clone(),
        }
    }

    pub fn get(&self, name: &str) -> PresetResult<Preset> {
        let name = name.trim();
        self.doc
            .lock()
            .presets
            .get(name)
            .map(|stored| to_preset(name, stored))
            .ok_or_else(|| PresetError::NotFound(name.to_string()))
    }

    /// Returns the stored geometry of a preset, unmodified.
    pub fn load(&self, name: &str) -> PresetResult<Geometry> {
        self.get(name).map(|preset| preset.geometry)
    }

    /// The default preset, if one is designated.
    pub fn default_preset(&self) -> Option<Preset> {
        let doc = self.doc.lock();
        let name = doc.default.as_ref()?;
        doc.presets.get(name).map(|stored| to_preset(name, stored))
    }

    /// Inserts or overwrites a preset.
    ///
    /// The geometry is validated but not fitted to the display; presets are
    /// stored verbatim and fitted when applied.
    pub fn save(&self, name: &str, geometry: Geometry, description: &str) -> PresetResult<Preset> {
        let name = validate_name(name)?;
        geometry.validate()?;

        let stored = StoredPreset {
            geometry,
            description: description.trim().to_string(),
        };
        self.mutate(|doc| {
            doc.presets.insert(name.clone(), stored.clone());
            Ok(())
        })?;

        log::info!("[Presets] Saved '{}' at {}", name, geometry);
        self.emitter.emit_preset(PresetEvent::Saved {
            name: name.clone(),
            geometry,
            timestamp: now_millis(),
        });
        Ok(to_preset(&name, &stored))
    }

    /// Deletes a preset, clearing the default designation if it matched.
    pub fn delete(&self, name: &str) -> PresetResult<()> {
        let name = name.trim().to_string();
        let mut cleared_default = false;
        self.mutate(|doc| {
            doc.presets
                .remove(&name)
                .ok_or_else(|| PresetError::NotFound(name.clone()))?;
            if doc.default.as_deref() == Some(name.as_str()) {
                doc.default = None;
                cleared_default = true;
            }
            Ok(())
        })?;

        log::info!("[Presets] Deleted '{}'", name);
        let timestamp = now_millis();
        self.emitter.emit_preset(PresetEvent::Deleted {
            name: name.clone(),
            timestamp,
        });
        if cleared_default {
            self.emitter.emit_preset(PresetEvent::DefaultChanged {
                name: None,
                timestamp,
            });
        }
        Ok(())
    }

    pub fn set_default(&self, name: &str) -> PresetResult<()> {
        let name = name.trim().to_string();
        self.mutate(|doc| {
            if !doc.presets.contains_key(&name) {
                return Err(PresetError::NotFound(name.clone()));
            }
            doc.default = Some(name.clone());
            Ok(())
        })?;

        log::info!("[Presets] Default set to '{}'", name);
        self.emitter.emit_preset(PresetEvent::DefaultChanged {
            name: Some(name),
            timestamp: now_millis(),
        });
        Ok(())
    }

    pub fn clear_default(&self) -> PresetResult<()> {
        self.mutate(|doc| {
            doc.default = None;
            Ok(())
        })?;

        log::info!("[Presets] Default cleared");
        self.emitter.emit_preset(PresetEvent::DefaultChanged {
            name: None,
            timestamp: now_millis(),
        });
        Ok(())
    }

    /// Applies `change` to a copy, persists it, then swaps it in.
    fn mutate<F>(&self, change: F) -> PresetResult<()>
    where
        F: FnOnce(&mut PresetDocument) -> PresetResult<()>,
    {
        let mut doc = self.doc.lock();
        let mut next = doc.clone();
        change(&mut next)?;
        if let Some(path) = &self.path {
            write_atomic(path, &next)?;
        }
        *doc = next;
        Ok(())
    }
}

fn to_preset(name: &str, stored: &StoredPreset) -> Preset {
    Preset {
        name: name.to_string(),
        geometry: stored.geometry,
        description: stored.description.clone(),
    }
}

fn validate_name(name: &str) -> PresetResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PresetError::InvalidName("name must not be empty".into()));
    }
    if name.chars().count() > MAX_PRESET_NAME_LEN {
        return Err(PresetError::InvalidName(format!(
            "name must be at most {MAX_PRESET_NAME_LEN} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(PresetError::InvalidName(
            "name must not contain control characters".into(),
        ));
    }
    Ok(name.to_string())
}

fn load_or_seed(path: &Path) -> PresetDocument {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<OnDisk>(&contents) {
            Ok(OnDisk::Current(doc)) => return doc.normalize(),
            Ok(OnDisk::Legacy(presets)) => {
                log::info!("[Presets] Upgrading legacy preset file {}", path.display());
                return PresetDocument {
                    presets,
                    default: None,
                };
            }
            Err(e) => {
                log::error!("[Presets] {} is corrupt: {}", path.display(), e);
                quarantine(path);
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("[Presets] No preset file, creating built-in presets");
        }
        Err(e) => {
            log::error!("[Presets] Cannot read {}: {}", path.display(), e);
            quarantine(path);
        }
    }

    let doc = PresetDocument::builtin();
    if let Err(e) = write_atomic(path, &doc) {
        log::warn!("[Presets] Could not write built-in presets: {}", e);
    }
    doc
}

fn quarantine(path: &Path) {
    let aside = sibling(path, "corrupt");
    match std::fs::rename(path, &aside) {
        Ok(()) => log::warn!("[Presets] Moved unreadable file to {}", aside.display()),
        Err(e) => log::warn!("[Presets] Could not move {} aside: {}", path.display(), e),
    }
}

/// `<path>.<suffix>` next to `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn write_atomic(path: &Path, doc: &PresetDocument) -> PresetResult<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let contents = serde_json::to_string_pretty(doc)?;
    let temp_path = sibling(path, "tmp");

    std::fs::write(&temp_path, contents)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::emitter::tests::RecordingEventEmitter;
    use crate::events::NoopEventEmitter;

    fn store_in(dir: &Path) -> PresetStore {
        PresetStore::open(Some(dir.join("presets.json")), Arc::new(NoopEventEmitter))
    }

    #[test]
    fn missing_file_is_seeded_with_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let list = store.list();
        assert_eq!(list.presets.len(), 7);
        assert_eq!(list.default, None);
        assert_eq!(
            store.load("corner-pip").unwrap(),
            Geometry::new(1280, 720, 640, 360)
        );
        assert!(dir.path().join("presets.json").exists());
    }

    #[test]
    fn save_then_load_round_trips_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        // Off-display geometry is stored verbatim; fitting happens on apply.
        let g = Geometry::new(3000, 10, 640, 360);
        store.save("far-right", g, "beyond 1080p").unwrap();

        assert_eq!(store.load("far-right").unwrap(), g);
        let reopened = store_in(dir.path());
        assert_eq!(reopened.load("far-right").unwrap(), g);
    }

    #[test]
    fn invalid_presets_are_rejected() {
        let store = PresetStore::open(None, Arc::new(NoopEventEmitter));
        let g = Geometry::new(0, 0, 640, 360);

        assert!(matches!(store.save("   ", g, ""), Err(PresetError::InvalidName(_))));
        assert!(matches!(
            store.save(&"x".repeat(65), g, ""),
            Err(PresetError::InvalidName(_))
        ));
        assert!(matches!(
            store.save("tiny", Geometry::new(0, 0, 50, 50), ""),
            Err(PresetError::InvalidGeometry(_))
        ));
        assert!(matches!(
            store.save("neg", Geometry::new(-1, 0, 200, 200), ""),
            Err(PresetError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn names_are_trimmed() {
        let store = PresetStore::open(None, Arc::new(NoopEventEmitter));
        store.save("  lobby  ", Geometry::new(0, 0, 640, 360), "").unwrap();
        assert!(store.get("lobby").is_ok());
    }

    #[test]
    fn deleting_default_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = Arc::new(RecordingEventEmitter::default());
        let store = PresetStore::open(Some(dir.path().join("presets.json")), emitter.clone());

        store.set_default("left-half").unwrap();
        assert_eq!(store.list().default.as_deref(), Some("left-half"));

        store.delete("left-half").unwrap();
        assert_eq!(store.list().default, None);
        assert!(store.default_preset().is_none());
        assert_eq!(store_in(dir.path()).list().default, None);

        let events = emitter.preset.lock();
        assert!(matches!(
            events.last(),
            Some(PresetEvent::DefaultChanged { name: None, .. })
        ));
    }

    #[test]
    fn unknown_names_are_not_found() {
        let store = PresetStore::open(None, Arc::new(NoopEventEmitter));
        assert!(matches!(store.load("nope"), Err(PresetError::NotFound(_))));
        assert!(matches!(store.delete("nope"), Err(PresetError::NotFound(_))));
        assert!(matches!(store.set_default("nope"), Err(PresetError::NotFound(_))));
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let store = PresetStore::open(
            Some(blocker.join("presets.json")),
            Arc::new(NoopEventEmitter),
        );
        let before = store.list();

        let err = store
            .save("lobby", Geometry::new(0, 0, 640, 360), "")
            .unwrap_err();
        assert!(matches!(err, PresetError::Io(_)));
        assert!(matches!(
            store.set_default("fullscreen"),
            Err(PresetError::Io(_))
        ));
        assert_eq!(store.list(), before);
    }

    #[test]
    fn legacy_bare_map_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        std::fs::write(
            &path,
            r#"{"stage":{"geometry":{"x":10,"y":20,"width":800,"height":450},"description":"Stage"}}"#,
        )
        .unwrap();

        let store = store_in(dir.path());
        assert_eq!(store.list().presets.len(), 1);
        assert_eq!(store.load("stage").unwrap(), Geometry::new(10, 20, 800, 450));
    }

    #[test]
    fn corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = store_in(dir.path());
        assert_eq!(store.list().presets.len(), 7);
        assert!(dir.path().join("presets.json.corrupt").exists());
    }

    #[test]
    fn dangling_default_is_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("presets.json"),
            r#"{"presets":{},"default":"ghost"}"#,
        )
        .unwrap();
        assert_eq!(store_in(dir.path()).list().default, None);
    }
}
