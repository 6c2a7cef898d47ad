// Download history, persisted as a JSON array
//
// Writes go through a temp file and a rename, so a crash mid-write leaves the
// previous history intact. Persistence failures are logged and never reach
// the download that triggered them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::OffsetDateTime;

use super::errors::PersistenceError;

/// One finished download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Local time, `YYYY-MM-DD HH:MM:SS`
    #[serde(rename = "date", alias = "timestamp")]
    pub timestamp: String,
    pub title: String,
    pub format: String,
    pub quality: String,
}

#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl HistoryStore {
    /// Open the store at `path`, loading whatever is already there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load(&path);
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn append(&mut self, title: &str, format: &str, quality: &str) {
        self.entries.push(HistoryEntry {
            timestamp: now_timestamp(),
            title: title.to_string(),
            format: format.to_string(),
            quality: quality.to_string(),
        });
        self.persist();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    fn persist(&self) {
        if let Err(e) = save(&self.path, &self.entries) {
            tracing::warn!("could not save download history: {}", e);
        }
    }
}

/// Read history from `path`. A missing or unreadable file yields no entries.
pub fn load(path: &Path) -> Vec<HistoryEntry> {
    match try_load(path) {
        Ok(entries) => entries,
        Err(PersistenceError::Io { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("ignoring download history: {}", e);
            Vec::new()
        }
    }
}

fn try_load(path: &Path) -> Result<Vec<HistoryEntry>, PersistenceError> {
    let data = fs::read_to_string(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn save(path: &Path, entries: &[HistoryEntry]) -> Result<(), PersistenceError> {
    let io_err = |source: std::io::Error| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_string_pretty(entries).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

fn now_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    now.format(&fmt).unwrap_or_else(|_| now.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("nope.json")).is_empty());
    }

    #[test]
    fn malformed_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load(&path).is_empty());
        assert!(HistoryStore::open(&path).entries().is_empty());
    }

    #[test]
    fn append_round_trips_through_a_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut store = HistoryStore::open(&path);
        store.append("First", "mp4", "720p");
        store.append("Second", "mp3", "192kbps");

        let reopened = HistoryStore::open(&path);
        assert_eq!(reopened.entries(), store.entries());
        assert_eq!(reopened.entries()[0].title, "First");
        assert_eq!(reopened.entries()[1].quality, "192kbps");
        assert_eq!(reopened.entries()[0].timestamp.len(), "2024-01-01 00:00:00".len());
        assert!(!dir.path().join("history.json.tmp").exists());
    }

    #[test]
    fn clear_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut store = HistoryStore::open(&path);
        store.append("x", "mp4", "best");
        store.clear();
        assert!(store.entries().is_empty());
        assert!(load(&path).is_empty());
    }

    #[test]
    fn reads_date_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(
            &path,
            r#"[{"date": "2024-05-01 10:00:00", "title": "t", "format": "mp4", "quality": "best"}]"#,
        )
        .unwrap();
        let entries = load(&path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp, "2024-05-01 10:00:00");

        let json = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(json["date"], "2024-05-01 10:00:00");
    }

    #[test]
    fn unwritable_path_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        let mut store = HistoryStore::open(blocker.join("history.json"));
        store.append("x", "mp4", "best");
        assert_eq!(store.entries().len(), 1);
    }
}
