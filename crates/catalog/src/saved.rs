use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const LIBRARY_KEY: &str = "ocean_player_library_track_ids";

/// Ordered list of saved track ids kept in a single JSON file.
///
/// Reads never fail: a missing or unreadable file is an empty library.
/// Writes are best effort and only logged when they fail.
#[derive(Debug, Clone)]
pub struct SavedTracks {
    path: PathBuf,
}

impl SavedTracks {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/ocean-player/ocean_player_library_track_ids.json`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("ocean-player").join(format!("{LIBRARY_KEY}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Vec<String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "no saved tracks");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(entries) => entries.into_iter().filter_map(saved_id).collect(),
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "ignoring malformed saved tracks");
                Vec::new()
            }
        }
    }

    pub fn save(&self, ids: &[String]) {
        if let Err(err) = self.write(ids) {
            warn!(path = %self.path.display(), error = %err, "failed to save library");
        }
    }

    fn write(&self, ids: &[String]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string(ids)?;
        std::fs::write(&self.path, body)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.load().iter().any(|saved| saved == id)
    }

    /// Adds the id at the end or removes it. Returns whether it is saved afterwards.
    pub fn toggle(&self, id: &str) -> bool {
        let mut ids = self.load();
        let saved = match ids.iter().position(|saved| saved == id) {
            Some(index) => {
                ids.remove(index);
                false
            }
            None => {
                ids.push(id.to_string());
                true
            }
        };
        self.save(&ids);
        saved
    }

    /// Appends ids not already present, keeping the existing order.
    pub fn add<I, S>(&self, new_ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids = self.load();
        for id in new_ids {
            let id = id.into();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        self.save(&ids);
        ids
    }

    pub fn clear(&self) {
        self.save(&[]);
    }
}

/// Numeric ids are kept as their decimal text. Other entries are skipped.
fn saved_id(entry: Value) -> Option<String> {
    match entry {
        Value::String(id) if !id.is_empty() => Some(id),
        Value::Number(n) => Some(n.to_string()),
        other => {
            debug!(entry = %other, "skipping saved entry that is not an id");
            None
        }
    }
}
