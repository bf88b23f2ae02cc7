//! Saved loops
//!
//! Only metadata is kept: the audio itself stays wherever the source string
//! points. Stored as JSON next to the settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::repetition::MAX_INTERVAL_SECONDS;
use crate::settings::config_dir;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Library file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Library file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("A saved loop needs a title")]
    EmptyTitle,

    #[error("No saved loop with id {0}")]
    NotFound(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LoopCategory {
    Faith,
    #[default]
    Study,
    Vision,
    Habits,
}

impl LoopCategory {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Faith => "Faith",
            Self::Study => "Study",
            Self::Vision => "Vision",
            Self::Habits => "Habits",
        }
    }

    pub fn all() -> &'static [LoopCategory] {
        &[Self::Faith, Self::Study, Self::Vision, Self::Habits]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedLoop {
    pub id: u64,
    pub title: String,
    pub category: LoopCategory,
    /// URL, file path or data URI, as accepted by `AudioSource::parse`
    pub source: String,
    pub interval_seconds: u32,
    #[serde(default)]
    pub play_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopLibrary {
    next_id: u64,
    loops: Vec<SavedLoop>,
}

fn library_path() -> PathBuf {
    config_dir().join("library.json")
}

impl LoopLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the library from disk, starting empty on any error.
    pub fn load() -> Self {
        let path = library_path();
        match Self::load_from(&path) {
            Ok(library) => {
                log::info!("Loaded {} saved loops", library.len());
                library
            }
            Err(LibraryError::Io(e)) => {
                log::info!("No library file found ({}), starting empty", e);
                Self::default()
            }
            Err(e) => {
                log::warn!("Failed to parse library ({}), starting empty", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, LibraryError> {
        let contents = std::fs::read_to_string(path)?;
        let mut library: Self = serde_json::from_str(&contents)?;
        // Never hand out an id that is already taken
        let max_id = library.loops.iter().map(|l| l.id).max().unwrap_or(0);
        library.next_id = library.next_id.max(max_id + 1);
        Ok(library)
    }

    pub fn save(&self) -> Result<(), LibraryError> {
        self.save_to(&library_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), LibraryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("Saved library to {}", path.display());
        Ok(())
    }

    /// Add a loop and return its id
    pub fn add(
        &mut self,
        title: &str,
        category: LoopCategory,
        source: &str,
        interval_seconds: u32,
    ) -> Result<u64, LibraryError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(LibraryError::EmptyTitle);
        }
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        self.loops.push(SavedLoop {
            id,
            title: title.to_string(),
            category,
            source: source.trim().to_string(),
            interval_seconds: interval_seconds.min(MAX_INTERVAL_SECONDS),
            play_count: 0,
        });
        Ok(id)
    }

    pub fn remove(&mut self, id: u64) -> Result<SavedLoop, LibraryError> {
        let index = self
            .loops
            .iter()
            .position(|l| l.id == id)
            .ok_or(LibraryError::NotFound(id))?;
        Ok(self.loops.remove(index))
    }

    pub fn rename(&mut self, id: u64, title: &str) -> Result<(), LibraryError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(LibraryError::EmptyTitle);
        }
        let entry = self.get_mut(id)?;
        entry.title = title.to_string();
        Ok(())
    }

    pub fn get(&self, id: u64) -> Option<&SavedLoop> {
        self.loops.iter().find(|l| l.id == id)
    }

    fn get_mut(&mut self, id: u64) -> Result<&mut SavedLoop, LibraryError> {
        self.loops
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(LibraryError::NotFound(id))
    }

    /// Count one more session started from this loop
    pub fn record_play(&mut self, id: u64) -> Result<u32, LibraryError> {
        let entry = self.get_mut(id)?;
        entry.play_count = entry.play_count.saturating_add(1);
        Ok(entry.play_count)
    }

    pub fn by_category(&self, category: LoopCategory) -> impl Iterator<Item = &SavedLoop> {
        self.loops.iter().filter(move |l| l.category == category)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SavedLoop> {
        self.loops.iter()
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }
}
