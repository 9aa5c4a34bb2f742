use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::session::Score;

/// One finished session as written to `history.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub date: DateTime<Local>,
    pub duration_secs: u64,
    pub wpm: u32,
    pub accuracy: u32,
    pub snippet_chars: usize,
    pub typed_chars: usize,
}

impl HistoryRecord {
    pub fn new(score: Score, duration_secs: u64, snippet: &str, input: &str) -> Self {
        Self {
            date: Local::now(),
            duration_secs,
            wpm: score.wpm,
            accuracy: score.accuracy,
            snippet_chars: snippet.chars().count(),
            typed_chars: input.chars().count(),
        }
    }
}

/// Append-only CSV log of finished sessions.
#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn append(&self, record: &HistoryRecord) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // header only goes into a fresh file
        let needs_header = fs::metadata(&self.path).map_or(true, |m| m.len() == 0);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_all(&self) -> crate::Result<Vec<HistoryRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut records = Vec::new();
        for record in reader.deserialize() {
            records.push(record?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(wpm: u32) -> HistoryRecord {
        HistoryRecord::new(Score { wpm, accuracy: 97 }, 60, "let x = 1;", "let x = 2;")
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let history = History::new(dir.path().join("history.csv"));
        assert!(history.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_append_writes_single_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("history.csv");
        let history = History::new(&path);

        history.append(&record(40)).unwrap();
        history.append(&record(55)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("duration_secs").count(), 1);
        assert!(text.starts_with("date,duration_secs,wpm,accuracy,snippet_chars,typed_chars"));

        let records = history.read_all().unwrap();
        let wpms: Vec<_> = records.iter().map(|r| r.wpm).collect();
        assert_eq!(wpms, vec![40, 55]);
        assert_eq!(records[0].snippet_chars, 10);
        assert_eq!(records[0].typed_chars, 10);
        assert_eq!(records[0].duration_secs, 60);
    }
}
