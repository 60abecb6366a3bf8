//! Local session history: one JSON file per bound player, newest first

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::record::{SessionRecord, Steam64};

/// Records kept per player
pub const MAX_RECORDS: usize = 50;

pub struct LocalHistory {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on the history files
    lock: Mutex<()>,
}

impl LocalHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn path_for(&self, player: &Steam64) -> PathBuf {
        self.dir.join(format!("{}.json", player))
    }

    /// Stored records, newest first. A missing file is an empty history.
    pub fn load(&self, player: &Steam64) -> Result<Vec<SessionRecord>, HistoryError> {
        let _guard = self.lock.lock();
        self.read(&self.path_for(player))
    }

    /// Prepend a record, dropping the oldest beyond [`MAX_RECORDS`]
    pub fn append(&self, player: &Steam64, record: SessionRecord) -> Result<(), HistoryError> {
        let _guard = self.lock.lock();
        let path = self.path_for(player);

        let mut records = self.read(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable history");
            Vec::new()
        });
        push_newest(&mut records, record);
        self.write(&path, &records)
    }

    /// Replace the whole cache, used after a refresh from the remote store
    pub fn replace(&self, player: &Steam64, mut records: Vec<SessionRecord>) -> Result<(), HistoryError> {
        let _guard = self.lock.lock();
        records.truncate(MAX_RECORDS);
        self.write(&self.path_for(player), &records)
    }

    pub fn clear(&self, player: &Steam64) -> Result<(), HistoryError> {
        let _guard = self.lock.lock();
        match fs::remove_file(self.path_for(player)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HistoryError::Io(e)),
        }
    }

    fn read(&self, path: &Path) -> Result<Vec<SessionRecord>, HistoryError> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(HistoryError::Io(e)),
        }
    }

    fn write(&self, path: &Path, records: &[SessionRecord]) -> Result<(), HistoryError> {
        fs::create_dir_all(&self.dir)?;

        // write-then-rename so a crash never leaves a truncated file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(records)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Prepend a record, dropping the oldest beyond [`MAX_RECORDS`]
pub fn push_newest(records: &mut Vec<SessionRecord>, record: SessionRecord) {
    records.insert(0, record);
    records.truncate(MAX_RECORDS);
}

/// Local persistence errors
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History file I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("History file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(score: u32) -> SessionRecord {
        SessionRecord {
            timestamp: score as i64,
            score,
            ..SessionRecord::default()
        }
    }

    fn player() -> Steam64 {
        Steam64::parse("76561198000000001").unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let history = LocalHistory::new(dir.path());
        assert!(history.load(&player()).unwrap().is_empty());
    }

    #[test]
    fn test_append_is_newest_first() {
        let dir = TempDir::new().unwrap();
        let history = LocalHistory::new(dir.path());

        history.append(&player(), record(1)).unwrap();
        history.append(&player(), record(2)).unwrap();

        let scores: Vec<u32> = history.load(&player()).unwrap().iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![2, 1]);
    }

    #[test]
    fn test_history_is_capped() {
        let dir = TempDir::new().unwrap();
        let history = LocalHistory::new(dir.path());

        for score in 0..(MAX_RECORDS as u32 + 5) {
            history.append(&player(), record(score)).unwrap();
        }

        let records = history.load(&player()).unwrap();
        assert_eq!(records.len(), MAX_RECORDS);
        assert_eq!(records[0].score, MAX_RECORDS as u32 + 4);
    }

    #[test]
    fn test_players_are_kept_apart() {
        let dir = TempDir::new().unwrap();
        let history = LocalHistory::new(dir.path());
        let id = player();

        let other = Steam64::parse("76561198000000009").unwrap();

        history.append(&id, record(7)).unwrap();
        history.append(&other, record(3)).unwrap();

        assert_eq!(history.load(&id).unwrap()[0].score, 7);
        assert_eq!(history.load(&other).unwrap()[0].score, 3);
    }

    #[test]
    fn test_corrupt_file_is_reported_then_overwritten() {
        let dir = TempDir::new().unwrap();
        let history = LocalHistory::new(dir.path());
        fs::write(dir.path().join("76561198000000001.json"), b"not json").unwrap();

        assert!(matches!(history.load(&player()), Err(HistoryError::Corrupt(_))));

        history.append(&player(), record(5)).unwrap();
        assert_eq!(history.load(&player()).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_and_clear() {
        let dir = TempDir::new().unwrap();
        let history = LocalHistory::new(dir.path());
        let id = player();

        history.append(&id, record(1)).unwrap();
        history.replace(&id, vec![record(9), record(8)]).unwrap();
        assert_eq!(history.load(&id).unwrap().len(), 2);

        history.clear(&id).unwrap();
        history.clear(&id).unwrap();
        assert!(history.load(&id).unwrap().is_empty());
    }
}
