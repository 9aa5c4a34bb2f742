use chrono::{DateTime, Utc};
use itertools::Itertools;
use rusqlite::{params, Connection};
use std::cell::RefCell;
use std::path::Path;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::session::Score;

/// One row of the leaderboard as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub username: String,
    pub wpm: u32,
    pub accuracy: u32,
    pub submitted_at: DateTime<Utc>,
}

/// A finished score on its way to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreSubmission {
    pub username: String,
    pub wpm: u32,
    pub accuracy: u32,
    pub timestamp: DateTime<Utc>,
}

impl ScoreSubmission {
    pub fn new(username: &str, score: Score) -> Self {
        Self {
            username: username.trim().to_string(),
            wpm: score.wpm,
            accuracy: score.accuracy,
            timestamp: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::EmptyUsername);
        }
        Ok(())
    }

    fn into_entry(self) -> LeaderboardEntry {
        LeaderboardEntry {
            username: self.username,
            wpm: self.wpm,
            accuracy: self.accuracy,
            submitted_at: self.timestamp,
        }
    }
}

/// Highest wpm first; ties go to whoever got there first.
pub fn sort_entries(entries: impl IntoIterator<Item = LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    entries
        .into_iter()
        .sorted_by(|a, b| {
            b.wpm
                .cmp(&a.wpm)
                .then_with(|| a.submitted_at.cmp(&b.submitted_at))
        })
        .collect()
}

pub type ScoresCallback = Box<dyn FnMut(&[LeaderboardEntry])>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: Vec<(u64, ScoresCallback)>,
    // unsubscribed while their callback was out for delivery
    dropped: Vec<u64>,
}

/// Callbacks registered through `subscribe_scores`.
#[derive(Clone, Default)]
pub struct Subscribers(Rc<RefCell<Registry>>);

impl Subscribers {
    pub fn add(&self, callback: ScoresCallback) -> Subscription {
        let mut reg = self.0.borrow_mut();
        reg.next_id += 1;
        let id = reg.next_id;
        reg.callbacks.push((id, callback));
        Subscription {
            id,
            registry: Rc::downgrade(&self.0),
        }
    }

    pub fn len(&self) -> usize {
        self.0.borrow().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&self, entries: &[LeaderboardEntry]) {
        let mut delivering = std::mem::take(&mut self.0.borrow_mut().callbacks);
        for (_, callback) in delivering.iter_mut() {
            callback(entries);
        }

        let mut reg = self.0.borrow_mut();
        let dropped = std::mem::take(&mut reg.dropped);
        delivering.retain(|(id, _)| !dropped.contains(id));
        delivering.append(&mut reg.callbacks);
        reg.callbacks = delivering;
    }
}

/// Live registration for leaderboard updates. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    /// Consumes the handle; `Drop` does the removal.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut reg = registry.borrow_mut();
        match reg.callbacks.iter().position(|(id, _)| *id == self.id) {
            Some(pos) => {
                reg.callbacks.remove(pos);
            }
            None => reg.dropped.push(self.id),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Where finished scores go. Subscribers receive the full sorted list once
/// on subscribe and again after every successful submit.
pub trait LeaderboardStore {
    fn submit_score(&self, score: &ScoreSubmission) -> Result<()>;
    fn subscribe_scores(&self, callback: ScoresCallback) -> Result<Subscription>;
    fn top_scores(&self, limit: usize) -> Result<Vec<LeaderboardEntry>>;
}

/// SQLite-backed leaderboard.
pub struct SqliteLeaderboard {
    conn: Connection,
    subscribers: Subscribers,
}

impl SqliteLeaderboard {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                wpm INTEGER NOT NULL,
                accuracy INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scores_wpm ON scores(wpm);
            "#,
        )?;

        Ok(Self {
            conn,
            subscribers: Subscribers::default(),
        })
    }

    fn query(&self, limit: Option<usize>) -> Result<Vec<LeaderboardEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT username, wpm, accuracy, timestamp
            FROM scores
            ORDER BY wpm DESC, timestamp ASC, id ASC
            LIMIT ?1
            "#,
        )?;

        // sqlite treats a negative limit as unbounded
        let limit = limit.map_or(-1, |l| l as i64);
        let rows = stmt.query_map([limit], |row| {
            let timestamp: String = row.get(3)?;
            let submitted_at = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?
                .with_timezone(&Utc);

            Ok(LeaderboardEntry {
                username: row.get(0)?,
                wpm: row.get(1)?,
                accuracy: row.get(2)?,
                submitted_at,
            })
        })?;

        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl LeaderboardStore for SqliteLeaderboard {
    fn submit_score(&self, score: &ScoreSubmission) -> Result<()> {
        score.validate()?;

        self.conn.execute(
            "INSERT INTO scores (username, wpm, accuracy, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![
                score.username,
                score.wpm,
                score.accuracy,
                score.timestamp.to_rfc3339(),
            ],
        )?;
        log::info!("saved score {} wpm for {}", score.wpm, score.username);

        if !self.subscribers.is_empty() {
            let entries = self.query(None)?;
            self.subscribers.notify(&entries);
        }
        Ok(())
    }

    fn subscribe_scores(&self, mut callback: ScoresCallback) -> Result<Subscription> {
        let entries = self.query(None)?;
        callback(&entries);
        Ok(self.subscribers.add(callback))
    }

    fn top_scores(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        self.query(Some(limit))
    }
}

/// Leaderboard kept in memory for the lifetime of the process.
#[derive(Default)]
pub struct MemoryLeaderboard {
    entries: RefCell<Vec<LeaderboardEntry>>,
    subscribers: Subscribers,
}

impl MemoryLeaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(&self) -> Vec<LeaderboardEntry> {
        sort_entries(self.entries.borrow().iter().cloned())
    }
}

impl LeaderboardStore for MemoryLeaderboard {
    fn submit_score(&self, score: &ScoreSubmission) -> Result<()> {
        score.validate()?;
        self.entries.borrow_mut().push(score.clone().into_entry());
        self.subscribers.notify(&self.sorted());
        Ok(())
    }

    fn subscribe_scores(&self, mut callback: ScoresCallback) -> Result<Subscription> {
        callback(&self.sorted());
        Ok(self.subscribers.add(callback))
    }

    fn top_scores(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        Ok(self.sorted().into_iter().take(limit).collect())
    }
}
